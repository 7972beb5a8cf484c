//! Config file resolution and graceful degradation
//!
//! Tests that manipulate TANDEM_CONFIG are marked with #[serial] so they do
//! not race each other on the process environment.

use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use tandem_common::config::{load_toml_or_default, resolve_config_path, CONFIG_ENV_VAR};
use tandem_common::Error;

#[derive(Debug, Deserialize, Default, PartialEq)]
struct Sample {
    #[serde(default)]
    port: u16,
    #[serde(default)]
    name: Option<String>,
}

#[test]
#[serial]
fn test_cli_argument_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/tandem-from-env.toml");
    let resolved = resolve_config_path(Some(Path::new("/tmp/tandem-from-cli.toml")), CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/tandem-from-cli.toml")));
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_argument() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/tandem-from-env.toml");
    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/tandem-from-env.toml")));
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "   ");
    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_ne!(resolved, Some(PathBuf::from("   ")));
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_missing_path_yields_defaults() {
    let config: Sample = load_toml_or_default(None).unwrap();
    assert_eq!(config, Sample::default());
}

#[test]
fn test_nonexistent_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let config: Sample = load_toml_or_default(Some(&path)).unwrap();
    assert_eq!(config, Sample::default());
}

#[test]
fn test_existing_file_is_parsed() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port = 5800\nname = \"living-room\"").unwrap();

    let config: Sample = load_toml_or_default(Some(file.path())).unwrap();
    assert_eq!(config.port, 5800);
    assert_eq!(config.name.as_deref(), Some("living-room"));
}

#[test]
fn test_malformed_file_is_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port = \"not a number\"").unwrap();

    let result: Result<Sample, Error> = load_toml_or_default(Some(file.path()));
    assert!(matches!(result, Err(Error::Config(_))));
}
