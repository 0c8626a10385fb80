//! The messaging seam between publications and mirrors.
//!
//! A [`Broker`] offers two primitives: named request/response handlers and
//! fire-and-forget topics. Anything that can carry JSON between processes
//! (a websocket router, a message bus, an in-process table) can implement it.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use tracing::{debug, trace};

use super::SyncError;
use crate::Result;

/// Handler for a named request. Runs synchronously on the caller's task.
pub type RpcHandler = Arc<dyn Fn(serde_json::Value) -> Result<serde_json::Value> + Send + Sync>;

/// Handler for messages published on a topic.
pub type TopicHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Identifies one topic subscription within a broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrokerSubscriptionId(u64);

impl BrokerSubscriptionId {
    /// Allocates a process-unique id, for broker implementations.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        BrokerSubscriptionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BrokerSubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request/response and publish/subscribe transport.
///
/// Messages published on one topic must reach each subscriber in publish
/// order.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Registers `handler` under `name`.
    async fn register(&self, name: &str, handler: RpcHandler) -> Result<()>;

    /// Removes the handler registered under `name`.
    async fn unregister(&self, name: &str) -> Result<()>;

    /// Invokes the handler registered under `name` and returns its reply.
    async fn call(&self, name: &str, args: serde_json::Value) -> Result<serde_json::Value>;

    /// Delivers `payload` to every subscriber of `topic`.
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()>;

    async fn subscribe(&self, topic: &str, handler: TopicHandler) -> Result<BrokerSubscriptionId>;

    async fn unsubscribe(&self, id: BrokerSubscriptionId) -> Result<()>;
}

/// In-process broker.
///
/// Calls and publications run the handlers directly on the calling task, so
/// delivery is immediate and ordered.
#[derive(Default)]
pub struct LocalBroker {
    handlers: RwLock<HashMap<String, RpcHandler>>,
    topics: RwLock<HashMap<String, Vec<(BrokerSubscriptionId, TopicHandler)>>>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a handler is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.read().unwrap().contains_key(name)
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .unwrap()
            .get(topic)
            .map_or(0, |subscribers| subscribers.len())
    }
}

#[async_trait]
impl Broker for LocalBroker {
    async fn register(&self, name: &str, handler: RpcHandler) -> Result<()> {
        let mut handlers = self.handlers.write().unwrap();
        if handlers.contains_key(name) {
            return Err(SyncError::AlreadyRegistered(name.to_string()).into());
        }
        handlers.insert(name.to_string(), handler);
        debug!(name, "registered handler");
        Ok(())
    }

    async fn unregister(&self, name: &str) -> Result<()> {
        match self.handlers.write().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(SyncError::NotRegistered(name.to_string()).into()),
        }
    }

    async fn call(&self, name: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        let handler = self
            .handlers
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::NotRegistered(name.to_string()))?;
        trace!(name, "calling handler");
        handler(args)
    }

    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()> {
        let subscribers: Vec<TopicHandler> = self
            .topics
            .read()
            .unwrap()
            .get(topic)
            .map(|subscribers| subscribers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();
        trace!(topic, subscribers = subscribers.len(), "publishing");
        for handler in subscribers {
            handler(payload.clone());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: TopicHandler) -> Result<BrokerSubscriptionId> {
        let id = BrokerSubscriptionId::next();
        self.topics
            .write()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));
        Ok(id)
    }

    async fn unsubscribe(&self, id: BrokerSubscriptionId) -> Result<()> {
        let mut topics = self.topics.write().unwrap();
        for subscribers in topics.values_mut() {
            if let Some(position) = subscribers.iter().position(|(existing, _)| *existing == id) {
                subscribers.remove(position);
                topics.retain(|_, subscribers| !subscribers.is_empty());
                return Ok(());
            }
        }
        Err(SyncError::UnknownSubscription(id).into())
    }
}
