// Configuration loading as the binaries use it

use std::time::Duration;
use tlc_core::{AppConfig, ConfigError};
use tlc_me::SessionSettings;

const SAMPLE: &str = r#"
[server]
bind_address = "127.0.0.1"
port = 8080
require_verification = false

[client]
token_endpoint = "http://127.0.0.1:8080/api/get-access-token"
session_duration_secs = 120
"#;

#[test]
fn test_toml_file_with_partial_sections() {
    let path = std::env::temp_dir().join(format!("tlc-config-{}.toml", std::process::id()));
    std::fs::write(&path, SAMPLE).unwrap();

    let config = AppConfig::from_file(path.to_str().unwrap()).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.server.port, 8080);
    assert!(!config.server.require_verification);
    // Unset keys keep their defaults
    assert_eq!(config.server.streaming_api_base, "https://api.heygen.com");
    assert_eq!(config.client.ready_timeout_secs, 30);
    config.validate().unwrap();

    let settings = SessionSettings::from(&config.client);
    assert_eq!(settings.session_duration, Duration::from_secs(120));
    assert_eq!(settings.ready_timeout, Duration::from_secs(30));
}

#[test]
fn test_default_settings_match_default_config() {
    let config = AppConfig::default();
    assert_eq!(SessionSettings::from(&config.client), SessionSettings::default());
}

#[test]
fn test_plain_http_provider_rejected() {
    let config: AppConfig = r#"{"server": {"streaming_api_base": "http://api.example.com"}}"#
        .parse()
        .unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
}

#[test]
fn test_missing_file_is_io_error() {
    let result = AppConfig::from_file("/nonexistent/tlc.toml");
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_broken_client_section_does_not_block_the_server() {
    let config: AppConfig = r#"
        [server]
        port = 8080

        [client]
        token_endpoint = "relative/path"
        ready_timeout_secs = 0
    "#
    .parse()
    .unwrap();

    config.server.validate().unwrap();
    assert!(matches!(config.client.validate(), Err(ConfigError::Validation(_))));
}
