mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FakeFetcher;
use lib_pollbus::sessions::{RestPollingSession, SessionKind, SessionState};
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn counts_requests_and_responses() {
    let fetcher = Arc::new(FakeFetcher::new().failing(&["http://rest/stock/ZZZZ/quote"]));
    let mut session = RestPollingSession::new(fetcher.clone());
    session
        .configure(
            [
                "http://rest/stock/AAPL/quote",
                "http://rest/stock/ZZZZ/quote",
                "http://rest/stock/AAPL/quote",
            ],
            Duration::from_millis(200),
        )
        .unwrap();

    session.start().await.unwrap();
    sleep(Duration::from_millis(700)).await;
    session.stop().await;

    // duplicate target polled once per tick
    assert_eq!(fetcher.calls_to("http://rest/stock/AAPL/quote"), 3);
    let report = session.report();
    assert_eq!(report.kind, SessionKind::RestPolling);
    assert_eq!(report.stats.requests_count, 6);
    assert_eq!(report.stats.responses_count, 3);
    assert_eq!(report.stats.messages_published_count, 0);
    assert_eq!(session.state(), SessionState::Stopped);

    let banner = report.to_string();
    assert!(banner.contains("RestPollingSession"));
}

#[tokio::test(start_paused = true)]
async fn reset_returns_to_idle_with_zeroed_stats() {
    let mut session = RestPollingSession::new(Arc::new(FakeFetcher::new()));
    session
        .configure(["http://rest/stock/AAPL/quote"], Duration::from_millis(100))
        .unwrap();
    session.start().await.unwrap();
    sleep(Duration::from_millis(250)).await;

    session.reset().await;
    assert_eq!(session.state(), SessionState::Idle);
    let stats = session.stats();
    assert_eq!(stats.requests_count, 0);
    assert!(stats.session_start_time.is_none());

    sleep(Duration::from_millis(500)).await;
    assert_eq!(session.stats().requests_count, 0);
}
