//! valet-server: loads configuration, wires the container and serves the
//! HTTP/WebSocket surface until ctrl-c.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use valet::{ServiceContainer, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_and_apply("valet", None).context("load configuration")?;
    let _guard = config::init_tracing("valet").context("init tracing")?;

    let settings = Settings::from_env().context("read settings")?;
    let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let container = Arc::new(ServiceContainer::build(settings).context("build services")?);
    container.validate_mcp_routes().await;

    let app = serve::router(Arc::clone(&container));
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(addr = %bind, "valet-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("serve")?;
    Ok(())
}
