//! # Polling Subscriber Session
//!
//! Subscribes to a set of topics and counts inbound messages. The counting
//! callback is built once per `start` and shared by every subscription.
//! Each topic is subscribed independently: one refused topic does not keep
//! the others from being subscribed. Once `stop` runs the callback stops
//! counting, even for a topic whose unsubscribe was refused.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::stats::{SessionKind, SessionReport, SessionStats, StatsSnapshot};
use super::{FailureSink, SessionError, SessionFailure, SessionState};
use crate::broker::{Broker, BrokerHandle, BrokerMessage, MessageCallback};

/// Subscribes to a topic set and counts what arrives.
pub struct SubscriberSession {
    broker: Arc<dyn Broker>,
    topics: Option<BTreeSet<String>>,
    active: Vec<String>,
    handle: Option<Arc<dyn BrokerHandle>>,
    // cleared by stop; the counting callback checks it
    listening: Arc<AtomicBool>,
    stats: Arc<SessionStats>,
    failures: FailureSink,
    state: SessionState,
}

impl SubscriberSession {
    /// Creates an unconfigured session.
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            topics: None,
            active: Vec::new(),
            handle: None,
            listening: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SessionStats::default()),
            failures: FailureSink::default(),
            state: SessionState::Idle,
        }
    }

    /// Sets the topics to subscribe to.
    pub fn configure<I, S>(&mut self, topics: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.state == SessionState::Running {
            return Err(SessionError::Running);
        }
        self.topics = Some(topics.into_iter().map(Into::into).collect());
        Ok(())
    }

    /// Topics currently subscribed.
    pub fn active_topics(&self) -> &[String] {
        &self.active
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Receiver for subscribe/unsubscribe failures. Replaces any earlier receiver.
    pub fn take_failures(&self) -> mpsc::UnboundedReceiver<SessionFailure> {
        self.failures.subscribe()
    }

    /// Resets, connects and subscribes to every configured topic.
    ///
    /// Only a failed connect is returned; refused subscriptions go to the
    /// failure sink and the topic is left out of the active set.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        let topics = self.topics.clone().ok_or(SessionError::NotConfigured)?;

        self.reset().await;
        self.stats.mark_started();

        let handle = match self.broker.connect().await {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Subscriber session could not connect: {}", e);
                self.stats.mark_ended();
                self.state = SessionState::Stopped;
                return Err(e.into());
            }
        };

        let listening = Arc::new(AtomicBool::new(true));
        self.listening = Arc::clone(&listening);
        let stats = Arc::clone(&self.stats);
        let on_message: MessageCallback = Arc::new(move |msg: BrokerMessage| {
            if !listening.load(Ordering::Acquire) {
                return;
            }
            log::trace!("Message on '{}' ({} bytes)", msg.topic, msg.payload.len());
            stats.record_received();
        });

        for topic in topics {
            match handle.subscribe(&topic, Arc::clone(&on_message)).await {
                Ok(()) => self.active.push(topic),
                Err(e) => self.failures.report(e.into()),
            }
        }

        self.handle = Some(handle);
        self.state = SessionState::Running;
        log::info!("Subscriber session started: {} topic(s) active", self.active.len());
        Ok(())
    }

    /// Stops counting, unsubscribes every active topic and stamps the end time.
    pub async fn stop(&mut self) {
        self.listening.store(false, Ordering::Release);
        let active = std::mem::take(&mut self.active);
        if let Some(handle) = &self.handle {
            for topic in active {
                if let Err(e) = handle.unsubscribe(&topic).await {
                    self.failures.report(e.into());
                }
            }
        }
        self.stats.mark_ended();
        if self.state == SessionState::Running {
            log::info!("Subscriber session stopped.");
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
        SessionReport::new(SessionKind::Subscriber, self.stats.snapshot())
    }
}
