//! Vendor cloud OTP login and device/group export — interface-only HTTP
//! service seeding the controller's YAML configuration (C9).

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use lb_exporter::config::ExporterConfig;
use lb_exporter::routes;
use lb_exporter::state::ExporterState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).json().init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "lb-exporter starting");

    let config = ExporterConfig::from_env();
    let state = ExporterState::new(&config);
    let shutdown = state.shutdown.clone();

    let app = routes::build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "export service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await?;

    tracing::info!("lb-exporter stopped");
    Ok(())
}
