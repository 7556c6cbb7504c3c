use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::sync::Mutex;
use url::Url;

use lib_pollbus::sessions::{PublisherSession, SessionError, SessionReport};

use crate::quote_logic::model::{
    StartRequest, StartResponse, StatsResponse, cors_json, error_response, quote_topic, quote_url,
};

#[derive(Clone)]
pub struct PublisherState {
    session: Arc<Mutex<PublisherSession>>,
    upstream: Url,
    // Set by the first successful /start
    started: Arc<AtomicBool>,
    tick_failures: Arc<AtomicU64>,
}

impl PublisherState {
    /// Wraps the session and starts counting its tick failures.
    /// Must be called from within a tokio runtime.
    pub fn new(session: PublisherSession, upstream: Url) -> Self {
        let tick_failures = Arc::new(AtomicU64::new(0));
        let mut failures = session.take_failures();
        let counter = Arc::clone(&tick_failures);
        tokio::spawn(async move {
            while failures.recv().await.is_some() {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });

        Self {
            session: Arc::new(Mutex::new(session)),
            upstream,
            started: Arc::new(AtomicBool::new(false)),
            tick_failures,
        }
    }

    /// Maps each symbol to its upstream quote URL and `T/{symbol}` topic.
    pub fn bindings_for(&self, symbols: &[String]) -> HashMap<String, String> {
        symbols
            .iter()
            .map(|s| (quote_url(&self.upstream, s).to_string(), quote_topic(s)))
            .collect()
    }

    /// Stops the session and returns its final report.
    pub async fn shutdown(&self) -> SessionReport {
        let mut session = self.session.lock().await;
        session.stop().await;
        session.report()
    }
}

pub fn router(state: PublisherState) -> Router {
    Router::new()
        .route("/start", post(start_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// (Re)starts publishing quotes for the requested symbols.
pub async fn start_handler(
    State(state): State<PublisherState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let (symbols, interval) = match request.validate() {
        Ok(valid) => valid,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, msg),
    };

    let bindings = state.bindings_for(&symbols);
    let mut session = state.session.lock().await;
    session.stop().await;

    if let Err(e) = session.configure(bindings, interval) {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }

    match session.start().await {
        Ok(()) => {
            state.started.store(true, Ordering::Relaxed);
            state.tick_failures.store(0, Ordering::Relaxed);
            log::info!("Publishing {} symbol(s) every {:?}", symbols.len(), interval);
            (
                StatusCode::OK,
                cors_json(),
                Json(StartResponse {
                    status: "SERVER STARTED!".to_string(),
                }),
            )
                .into_response()
        }
        Err(SessionError::Connect(e)) => {
            log::error!("Could not reach the message bus: {}", e);
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub async fn stats_handler(State(state): State<PublisherState>) -> Response {
    if !state.started.load(Ordering::Relaxed) {
        return error_response(StatusCode::NOT_FOUND, "no session has been started");
    }
    let report = state.session.lock().await.report();
    Json(StatsResponse {
        report,
        tick_failures: state.tick_failures.load(Ordering::Relaxed),
    })
    .into_response()
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::header;
    use lib_pollbus::broker::{Broker, InMemoryBroker};
    use lib_pollbus::retrieve::{FetchError, FetchResponse, Fetcher, Method};
    use std::time::Duration;

    struct QuoteFetcher {
        fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Fetcher for QuoteFetcher {
        async fn fetch(
            &self,
            target: &str,
            _method: Method,
            _body: Option<serde_json::Value>,
        ) -> Result<FetchResponse, FetchError> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(FetchError::Status {
                    target: target.to_string(),
                    status: 503,
                    body: String::new(),
                });
            }
            Ok(FetchResponse::ok(r#"{"latestPrice":1.0}"#))
        }
    }

    fn state_with(broker: InMemoryBroker) -> PublisherState {
        state_failing(broker, Arc::new(AtomicBool::new(false)))
    }

    fn state_failing(broker: InMemoryBroker, fail: Arc<AtomicBool>) -> PublisherState {
        let broker: Arc<dyn Broker> = Arc::new(broker);
        let session = PublisherSession::new(Arc::new(QuoteFetcher { fail }), broker)
            .with_stop_grace(Duration::from_millis(100));
        PublisherState::new(session, Url::parse("http://upstream.local/").unwrap())
    }

    fn start_body(symbols: &[&str], interval: Option<u64>) -> Result<Json<StartRequest>, JsonRejection> {
        Ok(Json(StartRequest {
            symbols: Some(symbols.iter().map(|s| s.to_string()).collect()),
            polling_interval: interval,
        }))
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn start_configures_bindings_and_answers_with_status() {
        let state = state_with(InMemoryBroker::new());
        let resp = start_handler(State(state.clone()), start_body(&["AAPL", "MSFT"], Some(60_000))).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(body_json(resp).await["status"], "SERVER STARTED!");

        {
            let session = state.session.lock().await;
            let bindings = session.bindings().unwrap();
            assert_eq!(bindings["http://upstream.local/stock/AAPL/quote"], "T/AAPL");
            assert_eq!(bindings["http://upstream.local/stock/MSFT/quote"], "T/MSFT");
            assert_eq!(session.interval(), Some(Duration::from_secs(60)));
        }
        state.shutdown().await;
    }

    #[tokio::test]
    async fn incomplete_start_request_is_rejected() {
        let state = state_with(InMemoryBroker::new());
        let resp = start_handler(State(state.clone()), start_body(&["AAPL"], None)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"].is_string());

        let resp = start_handler(State(state), start_body(&[], Some(1000))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unreachable_bus_is_bad_gateway() {
        let state = state_with(InMemoryBroker::unreachable());
        let resp = start_handler(State(state), start_body(&["AAPL"], Some(1000))).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn stats_are_not_found_until_started() {
        let state = state_with(InMemoryBroker::new());
        let resp = stats_handler(State(state.clone())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        start_handler(State(state.clone()), start_body(&["AAPL"], Some(60_000))).await;
        let resp = stats_handler(State(state.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["kind"], "publisher");
        assert_eq!(json["requestsCount"], 0);
        assert_eq!(json["tickFailures"], 0);
        assert!(json["sessionStartTime"].is_string());

        let report = state.shutdown().await;
        assert!(report.stats.session_end_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_clears_tick_failures() {
        let fail = Arc::new(AtomicBool::new(true));
        let state = state_failing(InMemoryBroker::new(), fail.clone());
        start_handler(State(state.clone()), start_body(&["AAPL"], Some(10))).await;
        tokio::time::sleep(Duration::from_millis(35)).await;

        let json = body_json(stats_handler(State(state.clone())).await).await;
        assert_eq!(json["requestsCount"], 3);
        assert!(json["tickFailures"].as_u64().unwrap() > 0);

        fail.store(false, Ordering::Relaxed);
        let resp = start_handler(State(state.clone()), start_body(&["AAPL"], Some(60_000))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(stats_handler(State(state.clone())).await).await;
        assert_eq!(json["requestsCount"], 0);
        assert_eq!(json["tickFailures"], 0);

        state.shutdown().await;
    }
}
