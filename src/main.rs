use anyhow::Context;

use todo_sync::config::SyncConfig;
use todo_sync::sync::{SyncHub, sync_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = SyncConfig::from_env();
    config.validate()?;

    eprintln!("🔁 todo-sync relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Sync WS: ws://0.0.0.0:{}/ws/sync", config.relay_port);
    eprintln!("   Health:  http://0.0.0.0:{}/health", config.relay_port);

    let hub = SyncHub::new(config.broadcast_capacity);
    let app = sync_routes(hub);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.relay_port))
        .await
        .with_context(|| format!("Failed to bind sync relay port {}", config.relay_port))?;
    tracing::info!(port = config.relay_port, "Sync relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down sync relay");
        })
        .await
        .context("Sync relay server failed")?;

    Ok(())
}
