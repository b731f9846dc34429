use citrine_client::config::ClientConfig;
use std::io::Write;

#[test]
fn defaults_are_sensible_and_valid() {
    let config = ClientConfig::default();
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 2113);
    assert_eq!(config.max_reconnections, 10);
    assert!(config.default_credentials.is_none());
    assert!(config.validate().is_ok());
    assert_eq!(config.addr(), "127.0.0.1:2113");
}

#[test]
fn from_file_fills_in_missing_fields() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
host = "db.internal"
port = 1113

[default_credentials]
login = "admin"
password = "changeit"
"#
    )
    .unwrap();

    let config = ClientConfig::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.addr(), "db.internal:1113");
    assert_eq!(config.heartbeat_interval_ms, 750);
    let credentials = config.default_credentials.expect("credentials configured");
    assert_eq!(credentials.login, "admin");
}

#[test]
fn from_file_rejects_a_missing_file() {
    assert!(ClientConfig::from_file("/definitely/not/here.toml").is_err());
}

#[test]
fn validate_rejects_inverted_reconnect_delays() {
    let config = ClientConfig {
        reconnection_delay_min_ms: 5_000,
        reconnection_delay_max_ms: 100,
        ..ClientConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn validate_rejects_zero_timers_and_buffers() {
    let zero_heartbeat = ClientConfig {
        heartbeat_interval_ms: 0,
        ..ClientConfig::default()
    };
    assert!(zero_heartbeat.validate().is_err());

    let zero_connect = ClientConfig {
        connect_timeout_ms: 0,
        ..ClientConfig::default()
    };
    assert!(zero_connect.validate().is_err());

    let zero_buffer = ClientConfig {
        pipeline_buffer: 0,
        ..ClientConfig::default()
    };
    assert!(zero_buffer.validate().is_err());
}
