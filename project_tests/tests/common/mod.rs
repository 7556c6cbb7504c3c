#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lib_pollbus::retrieve::{FetchError, FetchResponse, Fetcher, Method};

/// Answers every target with `{"target": ...}` unless it is marked failing.
#[derive(Default)]
pub struct FakeFetcher {
    failing: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets answered with a 503.
    pub fn failing(mut self, targets: &[&str]) -> Self {
        self.failing = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Time each fetch takes.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls_to(&self, target: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.as_str() == target)
            .count()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(
        &self,
        target: &str,
        _method: Method,
        _body: Option<serde_json::Value>,
    ) -> Result<FetchResponse, FetchError> {
        self.calls.lock().unwrap().push(target.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(target) {
            return Err(FetchError::Status {
                target: target.to_string(),
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(FetchResponse::ok(
            serde_json::json!({ "target": target }).to_string(),
        ))
    }
}
