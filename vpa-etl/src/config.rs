//! Pipeline configuration resolution
//!
//! Merges the TOML file with command-line overrides. Priority per setting:
//! command line → environment (data root only) → TOML → built-in default.

use crate::error::EtlResult;
use std::path::{Path, PathBuf};
use tracing::info;
use vpa_common::config::{
    load_config, resolve_data_root, AggregationConfig, AnchorSetting, ClickReduction, LayerPaths, LoggingConfig,
    PaymentAggregation, TomlConfig, WindowConfig, DATA_ROOT_ENV,
};

/// Settings passed on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub data_root: Option<PathBuf>,
    pub anchor_week: Option<AnchorSetting>,
    pub anchor_year: Option<i32>,
    pub payment_aggregation: Option<PaymentAggregation>,
    pub click_reduction: Option<ClickReduction>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub paths: LayerPaths,
    pub window: WindowConfig,
    pub aggregation: AggregationConfig,
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Read the config file (explicit path, `VPA_CONFIG`, or the default
    /// location) and apply the overrides
    pub fn load(config_path: Option<&Path>, overrides: &ConfigOverrides) -> EtlResult<Self> {
        let toml = load_config(config_path)?;
        Ok(Self::resolve(&toml, overrides))
    }

    pub fn resolve(toml: &TomlConfig, overrides: &ConfigOverrides) -> Self {
        let data_root = resolve_data_root(overrides.data_root.as_deref(), DATA_ROOT_ENV, toml);
        info!("Data root: {}", data_root.display());

        let mut window = toml.window.clone();
        if let Some(anchor) = overrides.anchor_week {
            window.anchor = anchor;
        }
        if let Some(year) = overrides.anchor_year {
            window.anchor_year = Some(year);
        }

        let mut aggregation = toml.aggregation;
        if let Some(mode) = overrides.payment_aggregation {
            aggregation.payment_aggregation = mode;
        }
        if let Some(mode) = overrides.click_reduction {
            aggregation.click_reduction = mode;
        }

        Self {
            paths: LayerPaths::resolve(&data_root, &toml.paths),
            window,
            aggregation,
            logging: toml.logging.clone(),
        }
    }

    /// Default settings with all layer folders under `data_root`
    pub fn for_data_root(data_root: &Path) -> Self {
        Self {
            paths: LayerPaths::resolve(data_root, &Default::default()),
            window: WindowConfig::default(),
            aggregation: AggregationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
