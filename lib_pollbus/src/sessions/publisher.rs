//! # Polling Publisher Session
//!
//! Given target → topic bindings and an interval, runs one periodic task per
//! target. Each tick:
//!
//! 1. counts a request,
//! 2. fetches the target,
//! 3. on success counts a response and publishes the body on the bound topic,
//! 4. counts the message once the publish went through.
//!
//! Failures are reported through the session's failure sink and never end
//! the task; the next tick simply tries again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::poller::PollerSet;
use super::stats::{SessionKind, SessionReport, SessionStats, StatsSnapshot};
use super::{FailureSink, SessionError, SessionFailure, SessionState, DEFAULT_STOP_GRACE};
use crate::broker::{Broker, BrokerHandle};
use crate::retrieve::{Fetcher, Method};

#[derive(Debug, Clone)]
struct PublisherConfig {
    bindings: HashMap<String, String>,
    interval: Duration,
}

/// Fetches every bound target on an interval and republishes the body.
pub struct PublisherSession {
    fetcher: Arc<dyn Fetcher>,
    broker: Arc<dyn Broker>,
    config: Option<PublisherConfig>,
    handle: Option<Arc<dyn BrokerHandle>>,
    stats: Arc<SessionStats>,
    pollers: PollerSet,
    failures: FailureSink,
    state: SessionState,
}

impl PublisherSession {
    /// Creates an unconfigured session.
    pub fn new(fetcher: Arc<dyn Fetcher>, broker: Arc<dyn Broker>) -> Self {
        Self {
            fetcher,
            broker,
            config: None,
            handle: None,
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

    /// Sets the target → topic bindings and the polling interval.
    ///
    /// Bindings stay fixed until the next `configure`, which is refused while
    /// the session is running.
    pub fn configure(
        &mut self,
        bindings: HashMap<String, String>,
        interval: Duration,
    ) -> Result<(), SessionError> {
        if self.state == SessionState::Running {
            return Err(SessionError::Running);
        }
        if interval.is_zero() {
            return Err(SessionError::InvalidInterval);
        }
        self.config = Some(PublisherConfig { bindings, interval });
        Ok(())
    }

    /// The configured bindings, if any.
    pub fn bindings(&self) -> Option<&HashMap<String, String>> {
        self.config.as_ref().map(|c| &c.bindings)
    }

    /// The configured interval, if any.
    pub fn interval(&self) -> Option<Duration> {
        self.config.as_ref().map(|c| c.interval)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Receiver for failures of running ticks. Replaces any earlier receiver.
    pub fn take_failures(&self) -> mpsc::UnboundedReceiver<SessionFailure> {
        self.failures.subscribe()
    }

    /// Resets, connects to the broker and launches one task per binding.
    ///
    /// A running session is reset first; its old counters and tasks are
    /// discarded. If the broker cannot be reached the session is left
    /// stopped and the error is returned.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        let config = self.config.clone().ok_or(SessionError::NotConfigured)?;

        self.reset().await;
        self.stats.mark_started();

        let handle = match self.broker.connect().await {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Publisher session could not connect: {}", e);
                self.stats.mark_ended();
                self.state = SessionState::Stopped;
                return Err(e.into());
            }
        };

        for (target, topic) in &config.bindings {
            let tick = Arc::new(PublishTick {
                target: target.clone(),
                topic: topic.clone(),
                fetcher: Arc::clone(&self.fetcher),
                handle: Arc::clone(&handle),
                stats: Arc::clone(&self.stats),
                failures: self.failures.clone(),
            });
            self.pollers.spawn(config.interval, move || {
                let tick = Arc::clone(&tick);
                async move { tick.run().await }
            });
        }

        self.handle = Some(handle);
        self.state = SessionState::Running;
        log::info!(
            "Publisher session started: {} target(s) every {:?}",
            self.pollers.len(),
            config.interval
        );
        Ok(())
    }

    /// Cancels every polling task, waits for in-flight ticks and stamps the
    /// end time. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        self.pollers.shutdown().await;
        self.stats.mark_ended();
        if self.state == SessionState::Running {
            log::info!("Publisher session stopped.");
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
        SessionReport::new(SessionKind::Publisher, self.stats.snapshot())
    }
}

struct PublishTick {
    target: String,
    topic: String,
    fetcher: Arc<dyn Fetcher>,
    handle: Arc<dyn BrokerHandle>,
    stats: Arc<SessionStats>,
    failures: FailureSink,
}

impl PublishTick {
    async fn run(&self) {
        self.stats.record_request();
        let response = match self.fetcher.fetch(&self.target, Method::GET, None).await {
            Ok(response) => response,
            Err(e) => {
                self.failures.report(e.into());
                return;
            }
        };
        self.stats.record_response();

        match self.handle.publish(&self.topic, &response.text()).await {
            Ok(()) => self.stats.record_published(),
            Err(e) => self.failures.report(e.into()),
        }
    }
}
