//! # REST Polling Session
//!
//! The direct-REST baseline: polls a list of targets on an interval and only
//! counts requests and responses. No broker is involved.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::poller::PollerSet;
use super::stats::{SessionKind, SessionReport, SessionStats, StatsSnapshot};
use super::{FailureSink, SessionError, SessionFailure, SessionState, DEFAULT_STOP_GRACE};
use crate::retrieve::{Fetcher, Method};

/// Polls each target on an interval and counts the outcome.
pub struct RestPollingSession {
    fetcher: Arc<dyn Fetcher>,
    targets: Vec<String>,
    interval: Option<Duration>,
    stats: Arc<SessionStats>,
    pollers: PollerSet,
    failures: FailureSink,
    state: SessionState,
}

impl RestPollingSession {
    /// Creates an unconfigured session.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            targets: Vec::new(),
            interval: None,
            stats: Arc::new(SessionStats::default()),
            pollers: PollerSet::new(DEFAULT_STOP_GRACE),
            failures: FailureSink::default(),
            state: SessionState::Idle,
        }
    }

    /// How long `stop` waits for in-flight ticks before aborting them.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.pollers.set_grace(grace);
        self
    }

    /// Sets the targets and the polling interval. Duplicate targets are dropped.
    pub fn configure<I, S>(&mut self, targets: I, interval: Duration) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.state == SessionState::Running {
            return Err(SessionError::Running);
        }
        if interval.is_zero() {
            return Err(SessionError::InvalidInterval);
        }
        let mut unique: Vec<String> = Vec::new();
        for target in targets.into_iter().map(Into::into) {
            if !unique.contains(&target) {
                unique.push(target);
            }
        }
        self.targets = unique;
        self.interval = Some(interval);
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Receiver for failures of running ticks. Replaces any earlier receiver.
    pub fn take_failures(&self) -> mpsc::UnboundedReceiver<SessionFailure> {
        self.failures.subscribe()
    }

    /// Resets and launches one task per target.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        let interval = self.interval.ok_or(SessionError::NotConfigured)?;

        self.reset().await;
        self.stats.mark_started();

        for target in &self.targets {
            let target = Arc::new(target.clone());
            let fetcher = Arc::clone(&self.fetcher);
            let stats = Arc::clone(&self.stats);
            let failures = self.failures.clone();
            self.pollers.spawn(interval, move || {
                let (target, fetcher, stats, failures) = (
                    Arc::clone(&target),
                    Arc::clone(&fetcher),
                    Arc::clone(&stats),
                    failures.clone(),
                );
                async move {
                    stats.record_request();
                    match fetcher.fetch(&target, Method::GET, None).await {
                        Ok(_) => stats.record_response(),
                        Err(e) => failures.report(e.into()),
                    }
                }
            });
        }

        self.state = SessionState::Running;
        log::info!(
            "REST polling session started: {} target(s) every {:?}",
            self.targets.len(),
            interval
        );
        Ok(())
    }

    /// Cancels every polling task, waits for in-flight ticks and stamps the
    /// end time.
    pub async fn stop(&mut self) {
        self.pollers.shutdown().await;
        self.stats.mark_ended();
        if self.state == SessionState::Running {
            log::info!("REST polling session stopped.");
        }
        self.state = SessionState::Stopped;
    }

    /// `stop` plus zeroed counters and unset timestamps.
    pub async fn reset(&mut self) {
        self.stop().await;
        self.stats.clear();
        self.state = SessionState::Idle;
    }

    /// Current statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Printable / serializable report of the current statistics.
    pub fn report(&self) -> SessionReport {
        SessionReport::new(SessionKind::RestPolling, self.stats.snapshot())
    }
}
