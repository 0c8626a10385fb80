//! Keeping containers in step across a [`Broker`].
//!
//! One side publishes a container under a topic; any number of other sides
//! mirror it. The protocol is small:
//!
//! - `"{topic}/fetch"` returns a deep copy of the published container.
//! - `"{topic}/post"` applies a change to it and answers with the applied
//!   change, or `null` when the change's preconditions no longer hold.
//! - Every change to the published container is broadcast on `topic`.
//!
//! A mirror posts its local edits, applies the broadcasts it receives, and
//! resynchronizes (fetch, then [`assign`](crate::Container::assign)) whenever
//! it finds itself out of step. Once remote traffic quiesces, every mirror
//! equals the published container.
//!
//! ```no_run
//! # async fn demo() -> livestate::Result<()> {
//! use std::sync::Arc;
//! use livestate::{Container, sync::{LocalBroker, SyncHub}};
//!
//! let hub = SyncHub::new(Arc::new(LocalBroker::new()));
//! let state = Container::namespace();
//! let publication = hub.publish("state", &state).await?;
//!
//! let mirror = hub.subscribe("state").await?;
//! mirror.container().set("x", 1)?;
//! mirror.flush().await?;
//! assert_eq!(state.get("x"), 1);
//! # publication.close().await?; mirror.close().await?;
//! # Ok(())
//! # }
//! ```

use std::{future::Future, sync::Arc};

use tracing::info;

use crate::{Container, Result};

pub mod broker;
pub mod config;
pub mod error;
mod mirror;
mod publication;

pub use broker::{Broker, BrokerSubscriptionId, LocalBroker, RpcHandler, TopicHandler};
pub use config::HubConfig;
pub use error::SyncError;
pub use mirror::Mirror;
pub use publication::Publication;

fn fetch_name(topic: &str) -> String {
    format!("{topic}/fetch")
}

fn post_name(topic: &str) -> String {
    format!("{topic}/post")
}

/// Runs a broker operation under the configured call timeout.
async fn timed<T>(
    config: &HubConfig,
    operation: &str,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(config.call_timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout {
            operation: operation.to_string(),
            timeout_ms: config.call_timeout.as_millis(),
        }
        .into()),
    }
}

/// Entry point for publishing and mirroring containers over one broker.
#[derive(Clone)]
pub struct SyncHub {
    broker: Arc<dyn Broker>,
    config: HubConfig,
}

impl SyncHub {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self::with_config(broker, HubConfig::default())
    }

    pub fn with_config(broker: Arc<dyn Broker>, config: HubConfig) -> Self {
        Self { broker, config }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Serves `container` under `topic`.
    ///
    /// Must be called from within a tokio runtime; the publication spawns a
    /// worker task that broadcasts changes in order.
    ///
    /// # Errors
    /// Fails if the topic's handlers are already registered with the broker.
    pub async fn publish(&self, topic: &str, container: &Container) -> Result<Publication> {
        let publication =
            Publication::start(self.broker.clone(), self.config.clone(), topic, container).await?;
        info!(topic, container = %container.id(), "published container");
        Ok(publication)
    }

    /// Mirrors the container published under `topic`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Fails if the initial fetch fails, times out, or returns something
    /// that is not a list or namespace.
    pub async fn subscribe(&self, topic: &str) -> Result<Mirror> {
        let mirror = Mirror::start(self.broker.clone(), self.config.clone(), topic).await?;
        info!(topic, container = %mirror.container().id(), "mirroring topic");
        Ok(mirror)
    }
}
