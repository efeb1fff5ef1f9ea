//! Configuration loading, atomic write-back and working directory resolution
//!
//! Tests touching `BPT_WORKING_DIR` are marked `#[serial]` so they do not
//! race on the process environment.

use bpt_common::config::{
    load_toml_config, resolve_working_dir, write_toml_config, CurriculumConfig, ExamplesScope,
    TieBreak, TomlConfig, WORKING_DIR_ENV,
};
use bpt_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn missing_config_file_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = load_toml_config(&temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn malformed_config_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.toml");
    std::fs::write(&path, "[curriculum\npass_limit = ").unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
fn invalid_curriculum_values_are_rejected_on_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("zero.toml");
    std::fs::write(&path, "[curriculum]\nmax_passes = 0\n").unwrap();

    assert!(matches!(load_toml_config(&path), Err(Error::Config(_))));
}

#[test]
fn atomic_write_round_trips_and_leaves_no_temp_file() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("nested").join("config.toml");

    let mut config = TomlConfig::default();
    config.curriculum = CurriculumConfig {
        pass_limit: 2,
        tie_break: TieBreak::Right,
        examples_scope: ExamplesScope::Matched,
        ..Default::default()
    };
    config.cycle.max_iterations = Some(7);
    config.external.parse = vec!["parser".into(), "--model".into(), "{model}".into()];

    write_toml_config(&config, &target).unwrap();

    assert!(target.exists());
    assert!(!target.with_extension("toml.tmp").exists());
    let loaded = load_toml_config(&target).unwrap();
    assert_eq!(loaded, config);
}

#[test]
#[serial]
fn cli_argument_beats_environment() {
    env::set_var(WORKING_DIR_ENV, "/tmp/bpt-env");
    let resolved = resolve_working_dir(Some(Path::new("/tmp/bpt-cli")), &TomlConfig::default());
    env::remove_var(WORKING_DIR_ENV);

    assert_eq!(resolved, PathBuf::from("/tmp/bpt-cli"));
}

#[test]
#[serial]
fn environment_beats_toml() {
    env::set_var(WORKING_DIR_ENV, "/tmp/bpt-env");
    let mut config = TomlConfig::default();
    config.cycle.working_dir = Some(PathBuf::from("/tmp/bpt-toml"));
    let resolved = resolve_working_dir(None, &config);
    env::remove_var(WORKING_DIR_ENV);

    assert_eq!(resolved, PathBuf::from("/tmp/bpt-env"));
}

#[test]
#[serial]
fn toml_used_when_no_overrides() {
    env::remove_var(WORKING_DIR_ENV);
    let mut config = TomlConfig::default();
    config.cycle.working_dir = Some(PathBuf::from("/tmp/bpt-toml"));

    assert_eq!(resolve_working_dir(None, &config), PathBuf::from("/tmp/bpt-toml"));
}

#[test]
#[serial]
fn compiled_default_is_non_empty() {
    env::remove_var(WORKING_DIR_ENV);
    let resolved = resolve_working_dir(None, &TomlConfig::default());
    assert!(!resolved.as_os_str().is_empty());
}
