use cls_log_shipper::app::{App, Config, ConfigError, LogFormat, LogLevel};
use cls_log_shipper::sender::{Network, PayloadFormat};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

const ENV_VARS: &[&str] = &[
    "CLS_REGION",
    "CLS_SECRET_ID",
    "CLS_SECRET_KEY",
    "CLS_TOKEN",
    "CLS_LOGSET",
    "CLS_TOPIC",
    "CLS_USE_INTERNAL_NETWORK",
    "CLS_ENDPOINT_HOST",
    "CLS_MAX_BATCH_BYTES",
    "CLS_MAX_BATCH_COUNT",
    "CLS_FLUSH_INTERVAL_SECS",
    "CLS_CHANNEL_CAPACITY",
    "CLS_REQUEST_TIMEOUT_SECS",
    "CLS_SHUTDOWN_GRACE_SECS",
    "CLS_PAYLOAD_FORMAT",
    "CLS_SOURCE",
    "CLS_FILENAME",
    "CLS_CONFIG_FILE",
    "LOG_LEVEL",
    "LOG_FORMAT",
];

fn clean_all_env_vars() {
    unsafe {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }
}

#[test]
#[serial]
fn test_config_from_args() {
    clean_all_env_vars();

    let config = Config::from_args([
        "cls-log-shipper",
        "--region",
        "ap-shanghai",
        "--secret-id",
        "id",
        "--secret-key",
        "key",
        "--token",
        "tok",
        "--logset",
        "ls",
        "--topic",
        "tp",
        "--use-internal-network",
        "false",
        "--max-batch-count",
        "50",
        "--payload-format",
        "json",
        "--log-level",
        "debug",
    ])
    .unwrap();

    assert_eq!(config.region.as_deref(), Some("ap-shanghai"));
    assert!(!config.use_internal_network);
    assert_eq!(config.max_batch_count, 50);
    assert_eq!(config.payload_format, PayloadFormat::Json);
    assert_eq!(config.log_level, LogLevel::Debug);

    let settings = config.validate().unwrap();
    assert_eq!(settings.network, Network::Public);
    assert_eq!(settings.auth.token, "tok");
    assert_eq!(settings.batch.max_count, 50);
}

#[test]
#[serial]
fn test_config_from_env() {
    clean_all_env_vars();
    unsafe {
        env::set_var("CLS_REGION", "ap-guangzhou");
        env::set_var("CLS_SECRET_ID", "env-id");
        env::set_var("CLS_SECRET_KEY", "env-key");
        env::set_var("CLS_TOKEN", "env-token");
        env::set_var("CLS_LOGSET", "env-logset");
        env::set_var("CLS_TOPIC", "env-topic");
        env::set_var("CLS_FLUSH_INTERVAL_SECS", "2");
        env::set_var("LOG_FORMAT", "json");
    }

    let config = Config::from_args(["cls-log-shipper"]).unwrap();
    clean_all_env_vars();

    assert_eq!(config.secret_id.as_deref(), Some("env-id"));
    assert_eq!(config.log_format, LogFormat::Json);

    let settings = config.validate().unwrap();
    assert_eq!(settings.topic, "env-topic");
    assert_eq!(settings.network, Network::Internal);
    assert_eq!(settings.batch.flush_interval, Duration::from_secs(2));
}

#[test]
#[serial]
fn test_missing_credentials_are_all_reported() {
    clean_all_env_vars();

    let config = Config::from_args(["cls-log-shipper", "--region", "ap-guangzhou"]).unwrap();
    let err = config.validate().unwrap_err();

    assert!(matches!(err, ConfigError::Invalid(_)));
    let message = err.to_string();
    for field in ["secret_id", "secret_key", "token", "logset", "topic"] {
        assert!(message.contains(field), "{field} not reported in: {message}");
    }
    assert!(!message.contains("region"));
}

#[test]
#[serial]
fn test_config_from_file() {
    clean_all_env_vars();

    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
region = "ap-beijing"
secret_id = "file-id"
secret_key = "file-key"
token = "file-token"
logset = "file-logset"
topic = "file-topic"
max_batch_bytes = 65536
endpoint_host = "cls.internal.example:8080"
source = "10.0.0.1"
"#
    )
    .unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let config = Config::load(["cls-log-shipper", "--config-file", path.as_str()]).unwrap();

    assert_eq!(config.region.as_deref(), Some("ap-beijing"));
    assert_eq!(config.max_batch_bytes, 65536);
    // Unset keys keep their defaults
    assert_eq!(config.max_batch_count, 1024);
    assert!(config.use_internal_network);

    let app = App::from_config(&config).unwrap();
    let client = app.build_client().unwrap();
    assert_eq!(client.host(), "cls.internal.example:8080");
    assert_eq!(client.region(), "ap-beijing");
    assert_eq!(app.settings().source.as_deref(), Some("10.0.0.1"));
}

#[test]
#[serial]
fn test_default_host_follows_region_and_network() {
    clean_all_env_vars();

    let config = Config {
        region: Some("ap-chengdu".into()),
        secret_id: Some("id".into()),
        secret_key: Some("key".into()),
        token: Some("tok".into()),
        logset: Some("ls".into()),
        topic: Some("tp".into()),
        use_internal_network: false,
        ..Config::default()
    };

    let client = App::from_config(&config).unwrap().build_client().unwrap();
    assert_eq!(client.host(), "ap-chengdu.cls.tencentcs.com");
}

#[test]
#[serial]
fn test_invalid_file_is_parse_error() {
    clean_all_env_vars();

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "max_batch_count = \"lots\"").unwrap();

    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
#[serial]
fn test_missing_file_is_file_error() {
    clean_all_env_vars();

    let err = Config::from_file(std::path::Path::new("/nonexistent/cls.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileError(_)));
}
