//! Configuration loading and data root resolution
//!
//! Tests that touch VPA_DATA_ROOT or VPA_CONFIG are marked #[serial] so they
//! never run in parallel with each other.

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use vpa_common::config::{
    load_config, load_toml_config, resolve_data_root, AnchorSetting, PaymentAggregation, TomlConfig, CONFIG_PATH_ENV,
    DATA_ROOT_ENV, DEFAULT_DATA_ROOT,
};
use vpa_common::Error;

fn config_with_root(root: &str) -> TomlConfig {
    let mut config = TomlConfig::default();
    config.paths.data_root = Some(PathBuf::from(root));
    config
}

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(DATA_ROOT_ENV, "/from/env");
    let root = resolve_data_root(Some(Path::new("/from/cli")), DATA_ROOT_ENV, &config_with_root("/from/toml"));
    env::remove_var(DATA_ROOT_ENV);
    assert_eq!(root, PathBuf::from("/from/cli"));
}

#[test]
#[serial]
fn test_env_beats_toml() {
    env::set_var(DATA_ROOT_ENV, "/from/env");
    let root = resolve_data_root(None, DATA_ROOT_ENV, &config_with_root("/from/toml"));
    env::remove_var(DATA_ROOT_ENV);
    assert_eq!(root, PathBuf::from("/from/env"));
}

#[test]
#[serial]
fn test_blank_env_is_ignored() {
    env::set_var(DATA_ROOT_ENV, "   ");
    let root = resolve_data_root(None, DATA_ROOT_ENV, &config_with_root("/from/toml"));
    env::remove_var(DATA_ROOT_ENV);
    assert_eq!(root, PathBuf::from("/from/toml"));
}

#[test]
#[serial]
fn test_fallback_default() {
    env::remove_var(DATA_ROOT_ENV);
    let root = resolve_data_root(None, DATA_ROOT_ENV, &TomlConfig::default());
    assert_eq!(root, PathBuf::from(DEFAULT_DATA_ROOT));
}

#[test]
fn test_load_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[paths]\ndata_root = \"/srv/vpa\"\n\n[window]\nanchor = 49\n\n[aggregation]\npayment_aggregation = \"exact\"\n",
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.paths.data_root, Some(PathBuf::from("/srv/vpa")));
    assert_eq!(config.window.anchor, AnchorSetting::Week(49));
    assert_eq!(config.window.trailing_weeks, 3);
    assert_eq!(config.aggregation.payment_aggregation, PaymentAggregation::Exact);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[window]\nanchor = 60\n").unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    env::remove_var(CONFIG_PATH_ENV);
    let dir = tempfile::tempdir().unwrap();
    let result = load_config(Some(&dir.path().join("absent.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_config_path_from_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vpa.toml");
    std::fs::write(&path, "[window]\nanchor = \"latest\"\nanchor_year = 2023\n").unwrap();

    env::set_var(CONFIG_PATH_ENV, &path);
    let result = load_config(None);
    env::remove_var(CONFIG_PATH_ENV);

    let config = result.unwrap();
    assert_eq!(config.window.anchor, AnchorSetting::Latest);
    assert_eq!(config.window.anchor_year, Some(2023));
}
