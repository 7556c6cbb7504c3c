use std::sync::Arc;

use anyhow::{Context, Result};

// Shared by both server binaries; each uses only part of it.
#[allow(dead_code)]
mod quote_logic;
use quote_logic::{config, model, proxy};

use lib_pollbus::loggers;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = config::load_config()?;
    let log_path = loggers::setup_logging("quote_proxy", &settings.log_dir, &settings.log_level)?;
    log::info!("Logging to {}", log_path.display());

    let upstream = model::parse_upstream(&settings.upstream_base_endpoint)
        .with_context(|| format!("invalid upstream endpoint {}", settings.upstream_base_endpoint))?;
    let fetcher = settings.fetcher()?;
    let app = proxy::router(proxy::ProxyState::new(Arc::new(fetcher), upstream));

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    log::info!("Quote proxy listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(quote_logic::shutdown_signal())
        .await
        .context("serving quote proxy")?;

    log::info!("Shutdown complete.");
    Ok(())
}
