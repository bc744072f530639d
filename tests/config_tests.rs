// Configuration loading integration tests
use hookwire::config::CoreConfig;
use hookwire::error::{ConfigError, ErrorKind, HookwireError};
use hookwire::events::{EventType, HookType};
use hookwire::CoreContext;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

#[tokio::test]
async fn test_config_file_parsing() {
    let config_yaml = r#"
bus:
  enabled: true
  replay_capacity: 250
  circuit_breaker_threshold: 3
  circuit_breaker_cooldown_ms: 1500
  handler_timeout_ms: 200
  debounce_ms:
    state_changed: 40
  throttle_ms:
    interaction: 100
  batch:
    event_types: [time_tick]
    max_batch_size: 8
    flush_interval_ms: 20
  max_event_age_ms: 5000
hooks:
  default_timeout_ms: 1000
  default_max_retries: 2
  forward_to_bus: false
"#;

    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("hookwire.yaml");
    fs::write(&config_path, config_yaml).unwrap();

    let config = CoreConfig::from_file(&config_path).unwrap();

    assert_eq!(config.bus.replay_capacity, 250);
    assert_eq!(config.bus.circuit_breaker_threshold, 3);
    assert_eq!(
        config.bus.circuit_breaker_cooldown(),
        Duration::from_millis(1500)
    );
    assert_eq!(config.bus.handler_timeout(), Some(Duration::from_millis(200)));
    assert_eq!(config.bus.debounce_ms.get(&EventType::StateChanged), Some(&40));
    assert_eq!(config.bus.throttle_ms.get(&EventType::Interaction), Some(&100));
    assert_eq!(config.bus.batch.event_types, vec![EventType::TimeTick]);
    assert_eq!(config.bus.batch.max_batch_size, 8);
    assert_eq!(
        config.bus.delivery_filter().max_event_age,
        Some(Duration::from_secs(5))
    );
    assert_eq!(config.hooks.default_timeout_ms, Some(1000));
    assert_eq!(config.hooks.default_max_retries, 2);
    assert!(!config.hooks.forward_to_bus);
    // Unspecified fields keep their defaults
    assert_eq!(config.hooks.retry_base_delay_ms, 100);
    assert_eq!(config.bus.timing_sample_capacity, 100);
}

#[tokio::test]
async fn test_partial_config_uses_defaults() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("hookwire.yaml");
    fs::write(&config_path, "hooks:\n  default_max_retries: 5\n").unwrap();

    let config = CoreConfig::from_file(&config_path).unwrap();
    assert_eq!(config.bus, CoreConfig::default().bus);
    assert_eq!(config.hooks.default_max_retries, 5);
}

#[test]
fn test_missing_file_is_not_found() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("absent.yaml");

    let err = CoreConfig::from_file(&config_path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    match err {
        HookwireError::Config(config_err) => match *config_err {
            ConfigError::NotFound { path } => assert_eq!(path, config_path),
            other => panic!("Expected NotFound, got {other:?}"),
        },
        other => panic!("Expected config error, got {other:?}"),
    }
}

#[test]
fn test_invalid_yaml_reports_file_and_location() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("broken.yaml");
    fs::write(&config_path, "bus:\n  replay_capacity: [1, 2\n").unwrap();

    let err = CoreConfig::from_file(&config_path).unwrap_err();
    match err {
        HookwireError::Config(config_err) => match *config_err {
            ConfigError::InvalidYaml {
                file_path, line, ..
            } => {
                assert_eq!(file_path.as_deref(), Some(config_path.as_path()));
                assert!(line.is_some());
            }
            other => panic!("Expected InvalidYaml, got {other:?}"),
        },
        other => panic!("Expected config error, got {other:?}"),
    }
}

#[test]
fn test_wrong_field_type_is_invalid_yaml() {
    let err = CoreConfig::from_yaml("bus:\n  replay_capacity: lots\n").unwrap_err();
    assert!(matches!(
        err,
        HookwireError::Config(ref config_err)
            if matches!(**config_err, ConfigError::InvalidYaml { .. })
    ));
}

#[test]
fn test_validation_rejects_zero_values() {
    let cases = [
        ("bus:\n  circuit_breaker_threshold: 0\n", "bus.circuit_breaker_threshold"),
        ("bus:\n  handler_timeout_ms: 0\n", "bus.handler_timeout_ms"),
        ("bus:\n  batch:\n    max_batch_size: 0\n", "bus.batch.max_batch_size"),
        ("bus:\n  debounce_ms:\n    state_changed: 0\n", "bus.debounce_ms.state_changed"),
        ("hooks:\n  default_timeout_ms: 0\n", "hooks.default_timeout_ms"),
    ];

    for (yaml, expected_field) in cases {
        match CoreConfig::from_yaml(yaml).unwrap_err() {
            HookwireError::Config(config_err) => match *config_err {
                ConfigError::InvalidValue { field, .. } => assert_eq!(field, expected_field),
                other => panic!("Expected InvalidValue for {expected_field}, got {other:?}"),
            },
            other => panic!("Expected config error for {expected_field}, got {other:?}"),
        }
    }
}

#[test]
fn test_hook_event_types_in_shaping_maps() {
    let yaml = "bus:\n  throttle_ms:\n    \"hook:scene_load\": 250\n    door_opened: 10\n";
    let config = CoreConfig::from_yaml(yaml).unwrap();
    assert_eq!(
        config
            .bus
            .throttle_ms
            .get(&EventType::Hook(HookType::SceneLoad)),
        Some(&250)
    );
    assert_eq!(
        config.bus.throttle_ms.get(&EventType::custom("door_opened")),
        Some(&10)
    );
}

#[tokio::test]
async fn test_context_from_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("hookwire.yaml");
    fs::write(&config_path, "bus:\n  replay_capacity: 3\n").unwrap();

    let ctx = CoreContext::from_file(&config_path).unwrap();
    assert_eq!(ctx.config().bus.replay_capacity, 3);

    for _ in 0..5 {
        ctx.emit(
            EventType::Interaction,
            None,
            hookwire::Payload::Empty,
            "test",
        )
        .await;
    }
    assert_eq!(ctx.bus().replay_len(), 3);
}

#[test]
fn test_context_from_invalid_file_fails() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("hookwire.yaml");
    fs::write(&config_path, "bus:\n  replay_capacity: 0\n").unwrap();
    assert!(CoreContext::from_file(&config_path).is_err());
}
