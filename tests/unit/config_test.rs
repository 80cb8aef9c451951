//! Tests for configuration validation

use bus_admission::config::{BridgeConfig, MAX_SERIALIZER_DEPTH};

#[test]
fn test_default_config_is_valid() {
    let cfg = BridgeConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.control_address, "scheduler.admission");
    assert_eq!(cfg.dispatch_address, "scheduler");
    assert_eq!(cfg.serializer_depth, 1);
}

#[test]
fn test_invalid_timeout() {
    let cfg = BridgeConfig::new().with_reply_timeout_ms(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_workers() {
    let cfg = BridgeConfig::new().with_dispatch_workers(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_pending() {
    let cfg = BridgeConfig::new().with_max_pending_checks(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_serializer_depth_bound() {
    assert!(BridgeConfig::new().with_serializer_depth(MAX_SERIALIZER_DEPTH).validate().is_ok());
    assert!(BridgeConfig::new().with_serializer_depth(MAX_SERIALIZER_DEPTH + 1).validate().is_err());
}

#[test]
fn test_empty_address_rejected() {
    let err = BridgeConfig::new().with_run_address("  ").validate().unwrap_err();
    assert!(err.contains("run_address"));
}

#[test]
fn test_duplicate_addresses_rejected() {
    let err = BridgeConfig::new()
        .with_item_address("events")
        .with_run_address("events")
        .validate()
        .unwrap_err();
    assert!(err.contains("run_address"));
    assert!(err.contains("item_address"));
}

#[test]
fn test_from_json_str_fills_defaults() {
    let cfg = BridgeConfig::from_json_str(r#"{ "reply_timeout_ms": 500, "dispatch_workers": 3 }"#).unwrap();
    assert_eq!(cfg.reply_timeout_ms, 500);
    assert_eq!(cfg.dispatch_workers, 3);
    assert_eq!(cfg.control_address, "scheduler.admission");
}

#[test]
fn test_from_json_str_rejects_invalid() {
    assert!(BridgeConfig::from_json_str(r#"{ "reply_timeout_ms": 0 }"#).is_err());
    assert!(BridgeConfig::from_json_str("not json").unwrap_err().starts_with("parse error"));
}

#[test]
fn test_config_serializes_round_trip() {
    let cfg = BridgeConfig::new().with_control_address("ctl");
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(BridgeConfig::from_json_str(&json).unwrap(), cfg);
}
