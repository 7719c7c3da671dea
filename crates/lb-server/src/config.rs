//! Controller configuration, loadable from environment (§6).
//!
//! Unlike the persisted device/group YAML (`lb_protocol::config`, read at
//! startup and rewritten by the exporter), everything here is process
//! configuration: where to bind, which files to read, and which ambient
//! behaviors (logging format, cloud relay) are switched on.

use std::time::Duration;

/// Device-facing TLS listener default (§6).
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:23779";
const DEFAULT_CONFIG_PATH: &str = "./config/devices.yaml";
const DEFAULT_TOKEN_CACHE_PATH: &str = "./config/token_cache.json";
const DEFAULT_MQTT_BASE_TOPIC: &str = "cync";

/// `LOG_FORMAT` values (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Human,
    Both,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("human") => LogFormat::Human,
            Ok("both") => LogFormat::Both,
            _ => LogFormat::Json,
        }
    }
}

/// `CLOUD_RELAY_*` configuration (§4.7).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub forward_to_cloud: bool,
    pub cloud_addr: Option<String>,
    pub disable_ssl_verification: bool,
    pub debug_packet_logging: bool,
}

impl RelayConfig {
    fn from_env() -> Self {
        Self {
            forward_to_cloud: env_bool("CLOUD_RELAY_FORWARD"),
            cloud_addr: std::env::var("CLOUD_RELAY_ADDR").ok(),
            disable_ssl_verification: env_bool("CLOUD_RELAY_DISABLE_SSL_VERIFICATION"),
            debug_packet_logging: env_bool("CLOUD_RELAY_DEBUG_PACKET_LOGGING"),
        }
    }
}

/// Top-level process configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub config_path: std::path::PathBuf,
    pub token_cache_path: std::path::PathBuf,
    pub mqtt: lb_mqtt::config::MqttConfig,
    pub relay: RelayConfig,
    pub log_format: LogFormat,
    pub debug_log_level: bool,
    pub perf_tracking: bool,
    pub perf_threshold: Duration,
    pub tls_cert_path: std::path::PathBuf,
    pub tls_key_path: std::path::PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("LB_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into()),
            config_path: std::env::var("LB_CONFIG_PATH")
                .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into())
                .into(),
            token_cache_path: std::env::var("LB_TOKEN_CACHE_PATH")
                .unwrap_or_else(|_| DEFAULT_TOKEN_CACHE_PATH.into())
                .into(),
            mqtt: {
                let mut mqtt = lb_mqtt::config::MqttConfig::from_env();
                if std::env::var("LB_MQTT_BASE_TOPIC").is_err() {
                    mqtt.base_topic = DEFAULT_MQTT_BASE_TOPIC.into();
                }
                mqtt
            },
            relay: RelayConfig::from_env(),
            log_format: LogFormat::from_env(),
            debug_log_level: env_bool("DEBUG_LOG_LEVEL"),
            perf_tracking: env_bool("PERF_TRACKING"),
            perf_threshold: Duration::from_millis(
                std::env::var("PERF_THRESHOLD_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(200),
            ),
            tls_cert_path: std::env::var("LB_TLS_CERT_PATH")
                .unwrap_or_else(|_| "./config/controller_cert.pem".into())
                .into(),
            tls_key_path: std::env::var("LB_TLS_KEY_PATH")
                .unwrap_or_else(|_| "./config/controller_key.pem".into())
                .into(),
        }
    }

    /// `EnvFilter` directive matching `DEBUG_LOG_LEVEL` (§6).
    pub fn env_filter_directive(&self) -> &'static str {
        if self.debug_log_level {
            "debug"
        } else {
            "info"
        }
    }
}

fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}
