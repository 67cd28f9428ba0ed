use offdeck_sync::{SyncConfig, SyncError};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::time::Duration;

#[test]
fn defaults() {
    let config = SyncConfig::default();
    assert_eq!(config.max_attempts, 3);
    assert!(config.refresh_cache_with_pending_retries);
    assert_eq!(config.completed_retention_days, 30);
    assert_eq!(config.rearm_window_days, 7);
    assert_eq!(config.rearm_max_attempts, 5);
    assert_eq!(config.cleanup_interval(), Duration::from_secs(3600));
    assert_eq!(config.rearm_interval(), Duration::from_secs(86_400));
    assert!(config.validate().is_ok());
}

#[test]
fn partial_file_keeps_other_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "max_attempts": 5, "refresh_cache_with_pending_retries": false }}"#
    )
    .unwrap();

    let config = SyncConfig::from_path(file.path()).unwrap();
    assert_eq!(
        config,
        SyncConfig {
            max_attempts: 5,
            refresh_cache_with_pending_retries: false,
            ..Default::default()
        }
    );
}

#[test]
fn missing_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SyncConfig::from_path(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn malformed_file_is_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "max_attempts = 3").unwrap();
    let err = SyncConfig::from_path(file.path()).unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn invalid_values_are_rejected_on_load() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "max_attempts": 0 }}"#).unwrap();
    let err = SyncConfig::from_path(file.path()).unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn validate_rejects_zero_intervals() {
    let config = SyncConfig {
        cleanup_interval_secs: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn validate_rejects_negative_windows() {
    let config = SyncConfig {
        rearm_window_days: -1,
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn round_trips_through_json() {
    let config = SyncConfig {
        rearm_max_attempts: 9,
        ..Default::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    let back: SyncConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}
