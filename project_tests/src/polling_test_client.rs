use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use url::Url;

mod symbols;

use lib_pollbus::broker::broker_from_url;
use lib_pollbus::loggers;
use lib_pollbus::retrieve::{Fetcher, HttpFetcher, Method};
use lib_pollbus::sessions::stats::format_elapsed_ms;
use lib_pollbus::sessions::{RestPollingSession, SubscriberSession};

/// Polls random NASDAQ quotes directly over REST while counting the same
/// quotes as they arrive through the polling publisher.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Number of distinct symbols to poll
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    symbol_count: u64,

    /// Milliseconds between polls of each symbol
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    polling_interval: u64,

    /// How long to run, in milliseconds
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    test_duration: u64,

    /// Base URL of the quote proxy
    #[clap(long, env = "REST_APP_BASE_ENDPOINT")]
    rest_base: String,

    /// Base URL of the polling publisher
    #[clap(long, env = "SOLACE_APP_BASE_ENDPOINT")]
    publisher_base: String,

    /// Message bus the publisher writes to
    #[clap(long, env = "BROKER_URL", default_value = "redis://127.0.0.1/")]
    broker_url: String,

    /// Per-request REST timeout in milliseconds; 0 disables it
    #[clap(long, env = "FETCH_TIMEOUT_MS", default_value_t = 10_000)]
    fetch_timeout_ms: u64,

    #[clap(long, env = "LOG_DIR", default_value = "./logs")]
    log_dir: PathBuf,

    #[clap(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    loggers::setup_logging("polling_test_client", &args.log_dir, &args.log_level)?;

    let interval = Duration::from_millis(args.polling_interval);
    let picked = symbols::pick_symbols(args.symbol_count as usize)?;
    let rest_base = Url::parse(&args.rest_base)
        .with_context(|| format!("invalid REST base endpoint {}", args.rest_base))?;
    let urls = picked
        .iter()
        .map(|s| symbols::rest_url(&rest_base, s).map(String::from))
        .collect::<Result<Vec<String>>>()?;
    let topics: Vec<String> = picked.iter().map(|s| symbols::topic(s)).collect();

    let mut fetcher = HttpFetcher::new(None, None)?;
    if args.fetch_timeout_ms > 0 {
        fetcher = fetcher.with_timeout(Duration::from_millis(args.fetch_timeout_ms))?;
    }
    let fetcher = Arc::new(fetcher);

    let mut rest = RestPollingSession::new(fetcher.clone());
    rest.configure(urls, interval)?;
    rest.start().await.context("starting REST polling")?;

    let mut subscriber = SubscriberSession::new(broker_from_url(&args.broker_url)?);
    subscriber.configure(topics)?;
    subscriber.start().await.context("starting subscriber")?;

    let start_url = format!("{}/start", args.publisher_base.trim_end_matches('/'));
    let body = json!({ "symbols": picked, "pollingInterval": args.polling_interval });
    let answer = fetcher
        .fetch(&start_url, Method::POST, Some(body))
        .await
        .context("asking the publisher to start")?;
    log::info!("Publisher answered: {}", answer.text());

    let duration = Duration::from_millis(args.test_duration);
    println!("Running test for {}...", format_elapsed_ms(args.test_duration as i64));
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                log::warn!("Cannot listen for Ctrl-C: {}", e);
            }
            log::info!("Ctrl-C received, finishing early.");
        }
    }

    rest.stop().await;
    subscriber.stop().await;
    println!("{}", rest.report());
    println!("{}", subscriber.report());
    Ok(())
}
