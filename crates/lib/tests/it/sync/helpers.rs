//! Helper functions for sync testing
//!
//! Broker wrappers that observe or stall traffic, and a helper that drains
//! every worker queue.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use livestate::{
    Result,
    sync::{
        Broker, BrokerSubscriptionId, HubConfig, LocalBroker, Mirror, Publication, RpcHandler,
        SyncHub, TopicHandler,
    },
};

/// A [`LocalBroker`] that counts calls per RPC name.
#[derive(Default)]
pub struct CountingBroker {
    inner: LocalBroker,
    calls: Mutex<HashMap<String, usize>>,
}

impl CountingBroker {
    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn local(&self) -> &LocalBroker {
        &self.inner
    }
}

#[async_trait]
impl Broker for CountingBroker {
    async fn register(&self, name: &str, handler: RpcHandler) -> Result<()> {
        self.inner.register(name, handler).await
    }

    async fn unregister(&self, name: &str) -> Result<()> {
        self.inner.unregister(name).await
    }

    async fn call(&self, name: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default() += 1;
        self.inner.call(name, args).await
    }

    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()> {
        self.inner.publish(topic, payload).await
    }

    async fn subscribe(&self, topic: &str, handler: TopicHandler) -> Result<BrokerSubscriptionId> {
        self.inner.subscribe(topic, handler).await
    }

    async fn unsubscribe(&self, id: BrokerSubscriptionId) -> Result<()> {
        self.inner.unsubscribe(id).await
    }
}

/// A broker whose calls never complete.
#[derive(Default)]
pub struct StalledBroker {
    inner: LocalBroker,
}

#[async_trait]
impl Broker for StalledBroker {
    async fn register(&self, name: &str, handler: RpcHandler) -> Result<()> {
        self.inner.register(name, handler).await
    }

    async fn unregister(&self, name: &str) -> Result<()> {
        self.inner.unregister(name).await
    }

    async fn call(&self, _name: &str, _args: serde_json::Value) -> Result<serde_json::Value> {
        std::future::pending().await
    }

    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<()> {
        self.inner.publish(topic, payload).await
    }

    async fn subscribe(&self, topic: &str, handler: TopicHandler) -> Result<BrokerSubscriptionId> {
        self.inner.subscribe(topic, handler).await
    }

    async fn unsubscribe(&self, id: BrokerSubscriptionId) -> Result<()> {
        self.inner.unsubscribe(id).await
    }
}

/// A hub over a fresh counting broker.
pub fn counting_hub() -> (SyncHub, Arc<CountingBroker>) {
    counting_hub_with(HubConfig::default().with_call_timeout(Duration::from_secs(5)))
}

pub fn counting_hub_with(config: HubConfig) -> (SyncHub, Arc<CountingBroker>) {
    let broker = Arc::new(CountingBroker::default());
    let hub = SyncHub::with_config(broker.clone(), config);
    (hub, broker)
}

/// Drains every queue until broadcasts triggered by earlier rounds have
/// been handled too.
pub async fn settle(publication: &Publication, mirrors: &[&Mirror]) {
    for _ in 0..3 {
        for mirror in mirrors {
            mirror.flush().await.unwrap();
        }
        publication.flush().await.unwrap();
    }
}
