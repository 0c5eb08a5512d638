//! Configuration loading and data root resolution
//!
//! The configuration file is optional. A missing file yields defaults; a file
//! that exists but does not parse is an error.

use crate::events::Layer;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Environment variable overriding the data root folder
pub const DATA_ROOT_ENV: &str = "VPA_DATA_ROOT";

/// Environment variable pointing at an explicit config file
pub const CONFIG_PATH_ENV: &str = "VPA_CONFIG";

/// Fallback data root when nothing else is configured
pub const DEFAULT_DATA_ROOT: &str = "./data";

/// Default number of weeks preceding the anchor week
pub const DEFAULT_TRAILING_WEEKS: u32 = 3;

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub paths: PathsConfig,
    pub window: WindowConfig,
    pub aggregation: AggregationConfig,
    pub logging: LoggingConfig,
}

/// `[paths]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Parent of the landing/bronze/silver/gold folders
    pub data_root: Option<PathBuf>,
    pub landing: Option<PathBuf>,
    pub bronze: Option<PathBuf>,
    pub silver: Option<PathBuf>,
    pub gold: Option<PathBuf>,
}

/// `[window]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// `"latest"` or an ISO week number
    pub anchor: AnchorSetting,
    /// ISO year of the anchor week; inferred from the prints when absent
    pub anchor_year: Option<i32>,
    /// Weeks preceding the anchor that belong to the window
    pub trailing_weeks: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            anchor: AnchorSetting::Latest,
            anchor_year: None,
            trailing_weeks: DEFAULT_TRAILING_WEEKS,
        }
    }
}

/// `[aggregation]` section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub payment_aggregation: PaymentAggregation,
    pub click_reduction: ClickReduction,
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Which week anchors the trailing window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AnchorRepr", into = "AnchorRepr")]
pub enum AnchorSetting {
    /// Most recent ISO week present in the prints
    #[default]
    Latest,
    /// Explicit ISO week number (1-53)
    Week(u32),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum AnchorRepr {
    Week(u32),
    Keyword(String),
}

impl TryFrom<AnchorRepr> for AnchorSetting {
    type Error = String;

    fn try_from(repr: AnchorRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            AnchorRepr::Week(week) => AnchorSetting::from_week(week),
            AnchorRepr::Keyword(keyword) => keyword.parse(),
        }
    }
}

impl From<AnchorSetting> for AnchorRepr {
    fn from(setting: AnchorSetting) -> Self {
        match setting {
            AnchorSetting::Latest => AnchorRepr::Keyword("latest".to_string()),
            AnchorSetting::Week(week) => AnchorRepr::Week(week),
        }
    }
}

impl AnchorSetting {
    fn from_week(week: u32) -> std::result::Result<Self, String> {
        if (1..=53).contains(&week) {
            Ok(AnchorSetting::Week(week))
        } else {
            Err(format!("ISO week must be between 1 and 53, got {}", week))
        }
    }
}

impl FromStr for AnchorSetting {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("latest") {
            return Ok(AnchorSetting::Latest);
        }
        trimmed
            .parse::<u32>()
            .map_err(|_| format!("expected \"latest\" or an ISO week number, got {:?}", s))
            .and_then(AnchorSetting::from_week)
    }
}

impl fmt::Display for AnchorSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorSetting::Latest => write!(f, "latest"),
            AnchorSetting::Week(week) => write!(f, "{}", week),
        }
    }
}

/// How payment totals are folded per (user, week label, value prop)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAggregation {
    /// Collapse identical totals into one before counting and summing
    #[default]
    Distinct,
    /// Count and sum every joined payment row
    Exact,
}

impl FromStr for PaymentAggregation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "distinct" => Ok(PaymentAggregation::Distinct),
            "exact" => Ok(PaymentAggregation::Exact),
            other => Err(format!("unknown payment aggregation: {}", other)),
        }
    }
}

/// How several prints of one value prop fold into a single click flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickReduction {
    /// Last row seen for the value prop wins
    #[default]
    LastSeen,
    /// 1 if any row for the value prop was clicked
    Any,
}

impl FromStr for ClickReduction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "last_seen" => Ok(ClickReduction::LastSeen),
            "any" => Ok(ClickReduction::Any),
            other => Err(format!("unknown click reduction: {}", other)),
        }
    }
}

/// Default config file location: `<config dir>/vpa/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vpa").join("config.toml"))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load configuration following priority order:
/// 1. Explicit path (command line), must exist
/// 2. `VPA_CONFIG` environment variable, must exist
/// 3. Default user config file, if present
/// 4. Built-in defaults
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let explicit = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        info!("Loading config from {}", path.display());
        return load_toml_config(&path);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            info!("Loading config from {}", path.display());
            load_toml_config(&path)
        }
        _ => {
            debug!("No config file found, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Data root resolution priority:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. `./data` (fallback)
pub fn resolve_data_root(cli_arg: Option<&Path>, env_var_name: &str, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.paths.data_root {
        return path.clone();
    }

    PathBuf::from(DEFAULT_DATA_ROOT)
}

/// Resolved folder for each layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerPaths {
    pub landing: PathBuf,
    pub bronze: PathBuf,
    pub silver: PathBuf,
    pub gold: PathBuf,
}

impl LayerPaths {
    /// `<root>/landing`, `<root>/bronze`, ... unless overridden in `[paths]`
    pub fn resolve(data_root: &Path, paths: &PathsConfig) -> Self {
        let pick = |over: &Option<PathBuf>, name: &str| {
            over.clone().unwrap_or_else(|| data_root.join(name))
        };
        Self {
            landing: pick(&paths.landing, "landing"),
            bronze: pick(&paths.bronze, "bronze"),
            silver: pick(&paths.silver, "silver"),
            gold: pick(&paths.gold, "gold"),
        }
    }

    /// Origin and destination folders for a layer
    pub fn route(&self, layer: Layer) -> (&Path, &Path) {
        match layer {
            Layer::Bronze => (&self.landing, &self.bronze),
            Layer::Silver => (&self.bronze, &self.silver),
            Layer::Gold => (&self.silver, &self.gold),
        }
    }
}
