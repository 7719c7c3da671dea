//! Shared application state for the export service.
//!
//! The in-memory token cell is the source of truth (§4.9, S4); the token
//! cache file on disk is a write-behind copy read back only at startup.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Notify, RwLock};

use lb_protocol::config::{ControllerConfig, TokenCache};

use crate::cloud_client::CloudClient;

#[derive(Clone)]
pub struct ExporterState {
    pub config_path: std::path::PathBuf,
    pub token_cache_path: std::path::PathBuf,
    pub cloud: Arc<CloudClient>,
    token: Arc<RwLock<Option<TokenCache>>>,
    pending_email: Arc<RwLock<Option<String>>>,
    /// Signaled by `POST /api/restart`; `main` awaits this to trigger a
    /// graceful shutdown of the HTTP listener (§4.9).
    pub shutdown: Arc<Notify>,
}

impl ExporterState {
    pub fn new(config: &crate::config::ExporterConfig) -> Self {
        let token = std::fs::read_to_string(&config.token_cache_path)
            .ok()
            .and_then(|raw| serde_json::from_str::<TokenCache>(&raw).ok());
        Self {
            config_path: config.config_path.clone(),
            token_cache_path: config.token_cache_path.clone(),
            cloud: Arc::new(CloudClient::new(config.cloud_base_url.clone())),
            token: Arc::new(RwLock::new(token)),
            pending_email: Arc::new(RwLock::new(None)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub fn config_present(&self) -> bool {
        self.config_path.exists()
    }

    pub async fn set_pending_email(&self, email: String) {
        *self.pending_email.write().await = Some(email);
    }

    pub async fn take_pending_email(&self) -> Option<String> {
        self.pending_email.read().await.clone()
    }

    /// Store the verified token in memory immediately, then spawn the
    /// write-behind persistence to the cache file. The caller does not
    /// await the write landing on disk (S4).
    pub async fn store_token(&self, access_token: String, expires_in_secs: i64) {
        let cache = TokenCache {
            token: access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in_secs),
        };
        *self.token.write().await = Some(cache.clone());

        let path = self.token_cache_path.clone();
        tokio::spawn(async move {
            if let Some(parent) = path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            match serde_json::to_vec_pretty(&cache) {
                Ok(bytes) => {
                    if let Err(err) = tokio::fs::write(&path, bytes).await {
                        tracing::warn!(%err, path = %path.display(), "failed to persist token cache");
                    }
                }
                Err(err) => tracing::warn!(%err, "failed to serialize token cache"),
            }
        });
    }

    pub async fn current_token(&self) -> Option<String> {
        self.token.read().await.as_ref().map(|c| c.token.clone())
    }

    /// Persist the exported topology to the configured YAML path.
    pub fn save_config(&self, topology: &ControllerConfig) -> Result<(), lb_protocol::config::ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        topology.save(&self.config_path)
    }
}
