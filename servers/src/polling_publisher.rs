use std::sync::Arc;

use anyhow::{Context, Result};

// Shared by both server binaries; each uses only part of it.
#[allow(dead_code)]
mod quote_logic;
use quote_logic::{config, model, publisher};

use lib_pollbus::broker::broker_from_url;
use lib_pollbus::loggers;
use lib_pollbus::sessions::PublisherSession;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = config::load_config()?;
    let log_path =
        loggers::setup_logging("polling_publisher", &settings.log_dir, &settings.log_level)?;
    log::info!("Logging to {}", log_path.display());

    let upstream = model::parse_upstream(&settings.upstream_base_endpoint)
        .with_context(|| format!("invalid upstream endpoint {}", settings.upstream_base_endpoint))?;
    let fetcher = settings.fetcher()?;
    let broker = broker_from_url(&settings.broker_url)?;

    let session = PublisherSession::new(Arc::new(fetcher), broker).with_stop_grace(settings.stop_grace);
    let state = publisher::PublisherState::new(session, upstream);
    let app = publisher::router(state.clone());

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    log::info!("Polling publisher listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(quote_logic::shutdown_signal())
        .await
        .context("serving polling publisher")?;

    let report = state.shutdown().await;
    log::info!("Final session report:\n{}", report);
    log::info!("Shutdown complete.");
    Ok(())
}
