//! Exporter process configuration (§6).

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8099;
const DEFAULT_CONFIG_PATH: &str = "./config/devices.yaml";
const DEFAULT_TOKEN_CACHE_PATH: &str = "./config/token_cache.json";
const DEFAULT_CLOUD_BASE_URL: &str = "https://api.gelighting.com";

#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub host: String,
    pub port: u16,
    pub config_path: std::path::PathBuf,
    pub token_cache_path: std::path::PathBuf,
    pub cloud_base_url: String,
}

impl ExporterConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("LB_EXPORTER_HOST").unwrap_or_else(|_| DEFAULT_HOST.into()),
            port: std::env::var("LB_EXPORTER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            config_path: std::env::var("LB_CONFIG_PATH")
                .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into())
                .into(),
            token_cache_path: std::env::var("LB_TOKEN_CACHE_PATH")
                .unwrap_or_else(|_| DEFAULT_TOKEN_CACHE_PATH.into())
                .into(),
            cloud_base_url: std::env::var("LB_CLOUD_BASE_URL").unwrap_or_else(|_| DEFAULT_CLOUD_BASE_URL.into()),
        }
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            config_path: DEFAULT_CONFIG_PATH.into(),
            token_cache_path: DEFAULT_TOKEN_CACHE_PATH.into(),
            cloud_base_url: DEFAULT_CLOUD_BASE_URL.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ExporterConfig::default();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.config_path, std::path::PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn from_env_reads_overrides() {
        std::env::set_var("LB_EXPORTER_PORT", "9100");
        let config = ExporterConfig::from_env();
        assert_eq!(config.port, 9100);
        std::env::remove_var("LB_EXPORTER_PORT");
    }
}
