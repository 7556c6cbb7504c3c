//! # Broker Connection Module
//!
//! The message bus behind the sessions, reduced to four primitives: connect,
//! publish, subscribe and unsubscribe. Sessions only ever see the traits below,
//! so the bus can be swapped for the in-process broker in tests.
//!
//! ## Contained Modules:
//! - **`redis_bus`**: Redis Pub/Sub.
//! - **`memory`**: an in-process bus with fault injection.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// In-process message bus.
pub mod memory;
/// Redis Pub/Sub message bus.
pub mod redis_bus;

pub use memory::InMemoryBroker;
pub use redis_bus::RedisBroker;

/// A message delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// UTF-8 payload.
    pub payload: String,
}

/// Inbound message callback. Invoked from the broker's delivery task.
pub type MessageCallback = Arc<dyn Fn(BrokerMessage) + Send + Sync>;

/// Failures of the broker primitives.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The bus could not be reached.
    #[error("broker connect failed: {0}")]
    Connect(String),

    /// A publish was rejected or lost.
    #[error("publish to '{topic}' failed: {reason}")]
    Publish {
        /// Target topic.
        topic: String,
        /// Cause.
        reason: String,
    },

    /// A subscription could not be registered.
    #[error("subscribe to '{topic}' failed: {reason}")]
    Subscribe {
        /// Requested topic.
        topic: String,
        /// Cause.
        reason: String,
    },

    /// A subscription could not be removed.
    #[error("unsubscribe from '{topic}' failed: {reason}")]
    Unsubscribe {
        /// Topic being dropped.
        topic: String,
        /// Cause.
        reason: String,
    },

    /// The broker URL scheme is not one we know.
    #[error("unsupported broker url '{0}' (expected redis://, rediss:// or memory://)")]
    UnsupportedUrl(String),
}

/// A live connection. One handle serves every publish/subscribe call of the
/// session that opened it and is never shared across sessions.
#[async_trait]
pub trait BrokerHandle: Send + Sync {
    /// Publishes `payload` on `topic`.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError>;

    /// Starts delivering messages on `topic` to `on_message`.
    async fn subscribe(&self, topic: &str, on_message: MessageCallback) -> Result<(), BrokerError>;

    /// Stops delivering messages on `topic`.
    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError>;
}

/// Opens connections to a message bus.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Establishes a new connection.
    async fn connect(&self) -> Result<Arc<dyn BrokerHandle>, BrokerError>;
}

/// Picks a broker implementation from a URL.
///
/// `redis://` and `rediss://` go to Redis; `memory://` gives a fresh,
/// process-local bus.
pub fn broker_from_url(url: &str) -> Result<Arc<dyn Broker>, BrokerError> {
    let scheme = url.split_once("://").map(|(s, _)| s.to_ascii_lowercase());
    match scheme.as_deref() {
        Some("redis") | Some("rediss") => Ok(Arc::new(RedisBroker::new(url))),
        Some("memory") => Ok(Arc::new(InMemoryBroker::new())),
        _ => Err(BrokerError::UnsupportedUrl(url.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_is_chosen_by_scheme() {
        assert!(broker_from_url("redis://127.0.0.1/").is_ok());
        assert!(broker_from_url("REDISS://cache.example:6380").is_ok());
        assert!(broker_from_url("memory://").is_ok());
        assert!(matches!(
            broker_from_url("amqp://localhost"),
            Err(BrokerError::UnsupportedUrl(_))
        ));
        assert!(broker_from_url("localhost:6379").is_err());
    }
}
