//! MQTT connection configuration for the home-automation bus (§6).

use serde::Deserialize;

/// Connection settings for the local MQTT broker (e.g. Mosquitto feeding
/// Home Assistant). Unlike the vendor-facing TLS listener, a local broker
/// commonly runs with no TLS at all, or with a CA-only TLS layer; client
/// certificates are supported but optional.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    #[serde(default = "default_port")]
    pub broker_port: u16,
    pub client_id: String,
    /// `$T` in the MQTT contract (§6). Default `cync`.
    #[serde(default = "default_base_topic")]
    pub base_topic: String,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub ca_cert_path: Option<String>,
    #[serde(default)]
    pub client_cert_path: Option<String>,
    #[serde(default)]
    pub client_key_path: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
}

fn default_port() -> u16 {
    1883
}

fn default_base_topic() -> String {
    "cync".to_string()
}

fn default_keepalive() -> u16 {
    30
}

impl MqttConfig {
    pub fn from_env() -> Self {
        Self {
            broker_host: std::env::var("LB_MQTT_HOST").unwrap_or_else(|_| "localhost".into()),
            broker_port: std::env::var("LB_MQTT_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_port),
            client_id: std::env::var("LB_MQTT_CLIENT_ID")
                .unwrap_or_else(|_| "lumibridge-controller".into()),
            base_topic: std::env::var("LB_MQTT_BASE_TOPIC")
                .unwrap_or_else(|_| default_base_topic()),
            use_tls: std::env::var("LB_MQTT_TLS")
                .map(|v| v == "true")
                .unwrap_or(false),
            ca_cert_path: std::env::var("LB_MQTT_CA_CERT").ok(),
            client_cert_path: std::env::var("LB_MQTT_CLIENT_CERT").ok(),
            client_key_path: std::env::var("LB_MQTT_CLIENT_KEY").ok(),
            username: std::env::var("LB_MQTT_USERNAME").ok(),
            password: std::env::var("LB_MQTT_PASSWORD").ok(),
            keepalive_secs: default_keepalive(),
        }
    }
}
