//! # In-Process Broker
//!
//! Topic routing inside one process. Every connection opened from the same
//! `InMemoryBroker` (or a clone of it) shares the routing table, so a
//! publisher handle and a subscriber handle see each other exactly like two
//! clients of a real bus.
//!
//! Delivery is synchronous: `publish` invokes the matching callbacks before it
//! returns. A broker built with [`InMemoryBroker::recording`] also keeps every
//! published payload per topic so callers can inspect what went over the
//! wire; the default broker keeps nothing, so a long-running process does not
//! grow with each publish.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Broker, BrokerError, BrokerHandle, BrokerMessage, MessageCallback};

#[derive(Default)]
struct Hub {
    /// topic -> (connection id, callback)
    routes: Mutex<HashMap<String, Vec<(u64, MessageCallback)>>>,
    /// topic -> payloads in publish order
    published: Mutex<HashMap<String, Vec<String>>>,
    next_connection: AtomicU64,
    recording: bool,
    unreachable: bool,
    rejected: HashSet<String>,
}

/// Process-local message bus.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    hub: Arc<Hub>,
}

impl InMemoryBroker {
    /// A working bus with no topics.
    pub fn new() -> Self {
        Self::default()
    }

    /// A working bus that keeps every published payload for [`published`](Self::published).
    pub fn recording() -> Self {
        Self {
            hub: Arc::new(Hub {
                recording: true,
                ..Hub::default()
            }),
        }
    }

    /// A bus that refuses every connection.
    pub fn unreachable() -> Self {
        Self {
            hub: Arc::new(Hub {
                unreachable: true,
                ..Hub::default()
            }),
        }
    }

    /// A recording bus that refuses subscriptions and publishes on the given topics.
    pub fn rejecting<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hub: Arc::new(Hub {
                rejected: topics.into_iter().map(Into::into).collect(),
                recording: true,
                ..Hub::default()
            }),
        }
    }

    /// Payloads published on `topic` so far. Always empty unless recording.
    pub fn published(&self, topic: &str) -> Vec<String> {
        let published = self.hub.published.lock().expect("Broker lock poisoned");
        published.get(topic).cloned().unwrap_or_default()
    }

    /// Number of live subscriptions on `topic`, across all connections.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let routes = self.hub.routes.lock().expect("Broker lock poisoned");
        routes.get(topic).map_or(0, Vec::len)
    }

    /// Number of connections opened so far.
    pub fn connection_count(&self) -> u64 {
        self.hub.next_connection.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn connect(&self) -> Result<Arc<dyn BrokerHandle>, BrokerError> {
        if self.hub.unreachable {
            return Err(BrokerError::Connect("in-memory broker is unreachable".into()));
        }
        let id = self.hub.next_connection.fetch_add(1, Ordering::Relaxed);
        log::debug!("in-memory connection {} opened", id);
        Ok(Arc::new(InMemoryHandle {
            hub: Arc::clone(&self.hub),
            id,
        }))
    }
}

struct InMemoryHandle {
    hub: Arc<Hub>,
    id: u64,
}

#[async_trait]
impl BrokerHandle for InMemoryHandle {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        if self.hub.rejected.contains(topic) {
            return Err(BrokerError::Publish {
                topic: topic.to_string(),
                reason: "topic rejected".into(),
            });
        }

        if self.hub.recording {
            self.hub
                .published
                .lock()
                .expect("Broker lock poisoned")
                .entry(topic.to_string())
                .or_default()
                .push(payload.to_string());
        }

        // Callbacks run outside the lock so they may publish themselves.
        let targets: Vec<MessageCallback> = {
            let routes = self.hub.routes.lock().expect("Broker lock poisoned");
            routes
                .get(topic)
                .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default()
        };

        for callback in targets {
            callback(BrokerMessage {
                topic: topic.to_string(),
                payload: payload.to_string(),
            });
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, on_message: MessageCallback) -> Result<(), BrokerError> {
        if self.hub.rejected.contains(topic) {
            return Err(BrokerError::Subscribe {
                topic: topic.to_string(),
                reason: "topic rejected".into(),
            });
        }

        let mut routes = self.hub.routes.lock().expect("Broker lock poisoned");
        let subs = routes.entry(topic.to_string()).or_default();
        // Re-subscribing on the same connection replaces the callback.
        subs.retain(|(id, _)| *id != self.id);
        subs.push((self.id, on_message));
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
        let mut routes = self.hub.routes.lock().expect("Broker lock poisoned");
        if let Some(subs) = routes.get_mut(topic) {
            subs.retain(|(id, _)| *id != self.id);
            if subs.is_empty() {
                routes.remove(topic);
            }
        }
        Ok(())
    }
}

impl Drop for InMemoryHandle {
    fn drop(&mut self) {
        if let Ok(mut routes) = self.hub.routes.lock() {
            routes.retain(|_, subs| {
                subs.retain(|(id, _)| *id != self.id);
                !subs.is_empty()
            });
        }
    }
}
