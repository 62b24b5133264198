// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use nv12_effect::config::PowerPreference;
use nv12_effect::errors::ConfigError;
use nv12_effect::{BackendType, Config, Effect, ReadbackPolicy};
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("nv12-effect-test-{}", std::process::id()))
        .join(name)
}

#[test]
fn test_missing_file_yields_defaults() {
    let config = Config::load(&temp_path("does-not-exist.json")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_save_then_load() {
    let path = temp_path("saved/config.json");
    let config = Config {
        effect: Effect::Identity,
        readback_policy: ReadbackPolicy::Synchronous,
        backend: BackendType::Software,
        power_preference: PowerPreference::LowPower,
    };
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded, config);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_malformed_file_is_an_error() {
    let path = temp_path("malformed.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ \"effect\": \"sepia\" }").unwrap();

    match Config::load(&path) {
        Err(ConfigError::Parse(_)) => {}
        other => panic!("expected a parse error, got {:?}", other),
    }
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_default_path_is_namespaced() {
    // Only meaningful where the platform has a config directory
    if let Some(path) = Config::default_path() {
        assert!(path.ends_with("nv12-effect/config.json"));
    }
}
