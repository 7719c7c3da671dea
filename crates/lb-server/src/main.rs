//! Local lighting bridge controller — device-facing TLS/TCP server, MQTT
//! bridge, and cloud relay in a single binary.
//!
//! Wires configuration and logging together; all component construction
//! and the shutdown sequence live in [`lb_server::supervisor::run`].

use tracing_subscriber::EnvFilter;

use lb_server::config::{LogFormat, ServerConfig};
use lb_server::error::ServerError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_addr = %config.bind_addr,
        "lb-server starting"
    );

    if let Err(err) = lb_server::supervisor::run(config).await {
        tracing::error!(%err, "controller exited with an error");
        std::process::exit(exit_code_for(&err));
    }

    tracing::info!("lb-server stopped");
    Ok(())
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.env_filter_directive()));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Human | LogFormat::Both => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

/// Configuration failures (bad YAML, unreadable paths) are the operator's
/// to fix; everything else surfacing out of `run` is an unrecoverable
/// startup failure (bad bind address, TLS setup, MQTT connect) (§6).
fn exit_code_for(err: &ServerError) -> i32 {
    match err {
        ServerError::Config(_) => 1,
        _ => 2,
    }
}
