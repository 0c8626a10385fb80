use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use super::{Broker, HubConfig, SyncError, fetch_name, post_name, timed};
use crate::{Change, Container, Result, Subscription};

/// Commands handled by a publication's worker.
#[derive(Debug)]
enum PublicationCommand {
    /// Publish a change made to the container
    Broadcast(Change),
    /// Reply once every earlier command has been handled
    Flush(oneshot::Sender<()>),
    /// Stop the worker
    Shutdown,
}

/// A container served under a topic.
///
/// Closing unregisters the handlers and stops broadcasting; dropping the
/// handle without closing leaves the handlers registered.
pub struct Publication {
    topic: String,
    container: Container,
    broker: Arc<dyn Broker>,
    subscription: Subscription,
    commands: mpsc::UnboundedSender<PublicationCommand>,
    closed: AtomicBool,
}

impl Publication {
    pub(super) async fn start(
        broker: Arc<dyn Broker>,
        config: HubConfig,
        topic: &str,
        container: &Container,
    ) -> Result<Self> {
        let served = container.clone();
        broker
            .register(
                &fetch_name(topic),
                Arc::new(move |_| Ok(served.snapshot().to_json())),
            )
            .await?;

        let target = container.clone();
        let post_topic = topic.to_string();
        let registered = broker
            .register(
                &post_name(topic),
                Arc::new(move |args| {
                    let change: Change = serde_json::from_value(args)?;
                    match target.apply(&change) {
                        Some(applied) => Ok(serde_json::to_value(applied.snapshot())?),
                        None => {
                            debug!(topic = %post_topic, change = %change, "rejected posted change");
                            Ok(serde_json::Value::Null)
                        }
                    }
                }),
            )
            .await;
        if let Err(err) = registered {
            let _ = broker.unregister(&fetch_name(topic)).await;
            return Err(err);
        }

        let (commands, receiver) = mpsc::unbounded_channel();
        let sender = commands.clone();
        let subscription = container.subscribe(move |change| {
            let _ = sender.send(PublicationCommand::Broadcast(change.snapshot()));
        });

        let worker = Broadcaster {
            topic: topic.to_string(),
            broker: broker.clone(),
            config,
            commands: receiver,
        };
        tokio::spawn(worker.run());

        Ok(Self {
            topic: topic.to_string(),
            container: container.clone(),
            broker,
            subscription,
            commands,
            closed: AtomicBool::new(false),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Waits until every change made so far has been broadcast.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(PublicationCommand::Flush(tx))
            .map_err(|_| SyncError::Closed(self.topic.clone()))?;
        rx.await
            .map_err(|_| SyncError::Closed(self.topic.clone()).into())
    }

    /// Stops serving the topic. Closing twice is a no-op.
    ///
    /// Changes already queued are still broadcast before the worker exits.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.subscription.cancel();
        let _ = self.commands.send(PublicationCommand::Shutdown);

        let fetch = self.broker.unregister(&fetch_name(&self.topic)).await;
        let post = self.broker.unregister(&post_name(&self.topic)).await;
        info!(topic = %self.topic, "publication closed");
        fetch.and(post)
    }
}

impl fmt::Debug for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publication")
            .field("topic", &self.topic)
            .field("container", &self.container)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Owns the outbound side of a publication.
struct Broadcaster {
    topic: String,
    broker: Arc<dyn Broker>,
    config: HubConfig,
    commands: mpsc::UnboundedReceiver<PublicationCommand>,
}

impl Broadcaster {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                PublicationCommand::Broadcast(change) => self.broadcast(change).await,
                PublicationCommand::Flush(done) => {
                    let _ = done.send(());
                }
                PublicationCommand::Shutdown => break,
            }
        }
        debug!(topic = %self.topic, "broadcaster stopped");
    }

    async fn broadcast(&self, change: Change) {
        let payload = match serde_json::to_value(&change) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(topic = %self.topic, change = %change, "cannot serialize change: {e}");
                return;
            }
        };
        trace!(topic = %self.topic, change = %change, "broadcasting change");
        let published = timed(
            &self.config,
            "broadcast",
            self.broker.publish(&self.topic, payload),
        )
        .await;
        if let Err(e) = published {
            warn!(topic = %self.topic, change = %change, "failed to broadcast change: {e}");
        }
    }
}
