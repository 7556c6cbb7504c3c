//! # Redis Pub/Sub Broker
//!
//! Each connection holds two Redis connections:
//! - a multiplexed `ConnectionManager` for `PUBLISH`,
//! - a dedicated Pub/Sub connection, split into a sink (SUBSCRIBE /
//!   UNSUBSCRIBE) and a message stream.
//!
//! A single background task pumps the message stream and dispatches each
//! message to the callback registered for its channel. The task is aborted
//! when the handle is dropped; there is no explicit disconnect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::{ConnectionManager, PubSubSink};
use redis::{AsyncCommands, RedisError};
use tokio::task::JoinHandle;

use super::{Broker, BrokerError, BrokerHandle, BrokerMessage, MessageCallback};

type Routes = Arc<Mutex<HashMap<String, MessageCallback>>>;

/// Redis-backed [`Broker`].
#[derive(Debug, Clone)]
pub struct RedisBroker {
    url: String,
}

impl RedisBroker {
    /// # Arguments
    /// * `url` - The redis URL (e.g., "redis://127.0.0.1/").
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Hands a message to the callback registered for its channel.
/// Returns false when nothing is subscribed to it.
fn dispatch(routes: &Routes, topic: String, payload: String) -> bool {
    // clone out of the lock so the callback runs unlocked
    let callback = routes
        .lock()
        .expect("Routes lock poisoned")
        .get(&topic)
        .cloned();
    match callback {
        Some(cb) => {
            cb(BrokerMessage { topic, payload });
            true
        }
        None => false,
    }
}

fn connect_error(e: RedisError) -> BrokerError {
    BrokerError::Connect(e.to_string())
}

#[async_trait]
impl Broker for RedisBroker {
    async fn connect(&self) -> Result<Arc<dyn BrokerHandle>, BrokerError> {
        let client = redis::Client::open(self.url.as_str()).map_err(connect_error)?;
        let publisher = client.get_connection_manager().await.map_err(connect_error)?;
        let (sink, mut stream) = client
            .get_async_pubsub()
            .await
            .map_err(connect_error)?
            .split();

        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let pump_routes = Arc::clone(&routes);
        let pump = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let topic = msg.get_channel_name().to_string();
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        log::warn!("Dropping undecodable message on '{}': {}", topic, e);
                        continue;
                    }
                };

                dispatch(&pump_routes, topic, payload);
            }
            log::info!("Redis pub/sub stream closed.");
        });

        log::info!("Connected to Redis at {}", self.url);
        Ok(Arc::new(RedisHandle {
            publisher,
            sink: tokio::sync::Mutex::new(sink),
            routes,
            pump,
        }))
    }
}

struct RedisHandle {
    publisher: ConnectionManager,
    sink: tokio::sync::Mutex<PubSubSink>,
    routes: Routes,
    pump: JoinHandle<()>,
}

#[async_trait]
impl BrokerHandle for RedisHandle {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        // ConnectionManager is a cheap clone over one multiplexed connection
        let mut conn = self.publisher.clone();
        let _receivers: i64 = conn
            .publish(topic, payload)
            .await
            .map_err(|e| BrokerError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, on_message: MessageCallback) -> Result<(), BrokerError> {
        // Register first so nothing that arrives right after SUBSCRIBE is lost.
        self.routes
            .lock()
            .expect("Routes lock poisoned")
            .insert(topic.to_string(), on_message);

        let result = self.sink.lock().await.subscribe(topic).await;
        if let Err(e) = result {
            self.routes.lock().expect("Routes lock poisoned").remove(topic);
            return Err(BrokerError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
        // Drop the route even if UNSUBSCRIBE fails; nothing may be delivered after this.
        self.routes.lock().expect("Routes lock poisoned").remove(topic);
        self.sink
            .lock()
            .await
            .unsubscribe(topic)
            .await
            .map_err(|e| BrokerError::Unsubscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

impl Drop for RedisHandle {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
