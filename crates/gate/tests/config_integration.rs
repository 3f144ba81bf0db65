//! Integration tests for configuration loading

#![cfg(feature = "config")]

use std::time::Duration;

use admission_gate::config::loader;
use admission_gate::{AdmissionGate, BulkheadSettings, GateConfig, GateError, GateOverride};

/// Validates that TOML and JSON files describing the same settings agree.
#[test]
fn test_toml_and_json_agree() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let toml_path = dir.path().join("bulkhead.toml");
    let json_path = dir.path().join("bulkhead.json");

    std::fs::write(
        &toml_path,
        "[bulkhead]\ncapacity = 5\ntimeout = \"2s\"\n\n[bulkhead.services.db]\ntimeout = 100\n",
    )?;
    std::fs::write(
        &json_path,
        r#"{"bulkhead": {"capacity": 5, "timeout": 2000, "services": {"db": {"timeout": "100ms"}}}}"#,
    )?;

    let from_toml = loader::load_from_file(Some(toml_path))?;
    let from_json = loader::load_from_file(Some(json_path))?;

    let expected = BulkheadSettings::new(GateConfig { capacity: 5, timeout: Duration::from_secs(2) })
        .with_service("db", GateOverride { capacity: None, timeout: Some(Duration::from_millis(100)) });
    assert_eq!(from_toml, expected);
    assert_eq!(from_json, expected);
    Ok(())
}

/// Validates that loaded settings build a working gate.
#[test]
fn test_loaded_settings_build_gate() {
    let settings = loader::load_from_env_with(|key| match key {
        loader::ENV_CAPACITY => Some("2".to_string()),
        loader::ENV_TIMEOUT => Some("0".to_string()),
        _ => None,
    })
    .expect("env settings load");

    let gate = AdmissionGate::from_config("auth", &settings.for_service("auth"))
        .expect("valid gate");

    assert_eq!(gate.capacity(), 2);
    assert_eq!(gate.timeout(), Duration::ZERO);
    assert_eq!(gate.name(), "auth");
}

/// Validates that malformed files surface as configuration errors.
#[test]
fn test_malformed_file_is_config_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("bulkhead.toml");
    std::fs::write(&path, "[bulkhead]\ncapacity = \"lots\"\n").expect("write toml");

    let err = loader::load_from_file(Some(path)).expect_err("capacity must be numeric");
    assert!(matches!(err, GateError::Config { .. }));
    assert!(err.to_string().contains("Invalid TOML format"));
}

/// Validates that settings round-trip through TOML serialization.
#[test]
fn test_settings_serialize_durations_as_millis() {
    let settings = BulkheadSettings::new(GateConfig { capacity: 3, timeout: Duration::from_secs(1) });

    let rendered = toml::to_string(&settings).expect("serialize settings");

    assert!(rendered.contains("timeout = 1000"));
    assert!(rendered.contains("capacity = 3"));
}
