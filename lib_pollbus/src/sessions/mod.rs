//! # Sessions Module
//!
//! A session is the lifecycle-bounded unit (start → stop) that owns a broker
//! connection, its bindings or topics, and its statistics. All sessions share
//! the same lifecycle:
//!
//! ```text
//!   Idle --start--> Running --stop--> Stopped
//!    ^                                  |
//!    +-------------reset----------------+   (start also resets first)
//! ```
//!
//! ## Contained Modules:
//! - **`publisher`**: fetch each target on an interval and publish the body.
//! - **`subscriber`**: subscribe to a topic set and count inbound messages.
//! - **`rest_poller`**: fetch each target on an interval and only count.
//! - **`stats`**: counters, timestamps and the printable report.
//!
//! Failures inside running tasks never stop a session. They are logged and,
//! when someone has called `take_failures`, forwarded on that channel.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::broker::BrokerError;
use crate::retrieve::FetchError;

mod poller;
/// Fetch-and-publish session.
pub mod publisher;
/// Fetch-only session.
pub mod rest_poller;
/// Session statistics and reports.
pub mod stats;
/// Subscribe-and-count session.
pub mod subscriber;

pub use publisher::PublisherSession;
pub use rest_poller::RestPollingSession;
pub use stats::{SessionKind, SessionReport, SessionStats, StatsSnapshot};
pub use subscriber::SubscriberSession;

/// Grace period `stop` gives in-flight ticks before aborting them.
pub const DEFAULT_STOP_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Configured or fresh, never started since the last reset.
    Idle,
    /// Tasks or subscriptions are live.
    Running,
    /// Stopped; counters are kept until the next reset.
    Stopped,
}

/// Synchronous failures of the lifecycle calls.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `start` was called before `configure`.
    #[error("session is not configured")]
    NotConfigured,

    /// `configure` was called on a running session.
    #[error("session is running; stop it before reconfiguring")]
    Running,

    /// A zero polling interval was supplied.
    #[error("polling interval must be greater than zero")]
    InvalidInterval,

    /// The broker could not be reached on `start`.
    #[error(transparent)]
    Connect(#[from] BrokerError),
}

/// A failure inside a running session, reported asynchronously.
#[derive(Debug, Error)]
pub enum SessionFailure {
    /// A tick's fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A publish, subscribe or unsubscribe failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Logs session failures and forwards them to an optional listener.
#[derive(Clone, Default)]
pub(crate) struct FailureSink {
    listener: Arc<Mutex<Option<mpsc::UnboundedSender<SessionFailure>>>>,
}

impl FailureSink {
    /// Installs a fresh listener, replacing any previous one.
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionFailure> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.listener.lock().expect("Failure sink lock poisoned") = Some(tx);
        rx
    }

    pub(crate) fn report(&self, failure: SessionFailure) {
        log::warn!("{}", failure);
        let mut listener = self.listener.lock().expect("Failure sink lock poisoned");
        if let Some(tx) = listener.as_ref() {
            if tx.send(failure).is_err() {
                // receiver dropped; stop forwarding
                *listener = None;
            }
        }
    }
}
