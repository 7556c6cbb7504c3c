use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use url::Url;

use lib_pollbus::retrieve::{Fetcher, Method};

use crate::quote_logic::model::{cors_json, error_response, quote_url};

#[derive(Clone)]
pub struct ProxyState {
    fetcher: Arc<dyn Fetcher>,
    upstream: Url,
}

impl ProxyState {
    pub fn new(fetcher: Arc<dyn Fetcher>, upstream: Url) -> Self {
        Self { fetcher, upstream }
    }
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/stock/{symbol}/quote", get(quote_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Forwards one quote lookup upstream and relays the JSON body.
pub async fn quote_handler(State(state): State<ProxyState>, Path(symbol): Path<String>) -> Response {
    let target = quote_url(&state.upstream, &symbol);
    match state.fetcher.fetch(target.as_str(), Method::GET, None).await {
        Ok(response) => (StatusCode::OK, cors_json(), response.body).into_response(),
        Err(e) => {
            log::warn!("Quote lookup for {} failed: {}", symbol, e);
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
