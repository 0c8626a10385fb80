use std::{
    collections::VecDeque,
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, ThreadId},
};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use super::{Broker, BrokerSubscriptionId, HubConfig, SyncError, fetch_name, post_name, timed};
use crate::{
    Change, Container, Result, Subscription, Value,
    deep::{diff, equal},
};

/// Accepted posts remembered while their broadcast is outstanding.
const ECHO_CAPACITY: usize = 4096;

/// The change the worker is applying, and the thread applying it.
///
/// Only that change, dispatched on that thread, is kept from being posted
/// back. Edits made concurrently from other threads, or by callbacks
/// reacting to it, are posted as usual.
#[derive(Default)]
struct Applying(Mutex<Option<(ThreadId, Change)>>);

impl Applying {
    fn begin(&self, change: &Change) {
        *self.0.lock().unwrap() = Some((thread::current().id(), change.clone()));
    }

    fn end(&self) {
        self.0.lock().unwrap().take();
    }

    /// Returns true, once, for the dispatch of the change being applied.
    fn absorbs(&self, dispatched: &Change) -> bool {
        let mut slot = self.0.lock().unwrap();
        let matches = slot.as_ref().is_some_and(|(owner, expected)| {
            *owner == thread::current().id()
                && expected.path() == dispatched.path()
                && match (expected.new_value(), dispatched.new_value()) {
                    (Some(a), Some(b)) => equal(a, b),
                    (None, None) => true,
                    _ => false,
                }
        });
        if matches {
            *slot = None;
        }
        matches
    }
}

/// Commands handled by a mirror's worker, in arrival order.
#[derive(Debug)]
enum MirrorCommand {
    /// Send a local change to the publisher
    Post(Change),
    /// Apply a change broadcast by the publisher
    Remote(Change),
    /// Fetch the published value and assign it locally
    Resync,
    /// Reply once every earlier command has been handled
    Flush(oneshot::Sender<()>),
    /// Stop the worker
    Shutdown,
}

/// A local container kept in step with a published one.
///
/// Edit [`container`](Mirror::container) like any other container; the
/// changes are posted to the publisher in the background. Dropping the handle
/// without [`close`](Mirror::close) leaves the broker subscription in place.
pub struct Mirror {
    topic: String,
    container: Container,
    broker: Arc<dyn Broker>,
    broadcasts: BrokerSubscriptionId,
    subscription: Subscription,
    commands: mpsc::UnboundedSender<MirrorCommand>,
    closed: Arc<AtomicBool>,
}

async fn fetch(broker: &dyn Broker, config: &HubConfig, topic: &str) -> Result<Value> {
    let reply = timed(
        config,
        "fetch",
        broker.call(&fetch_name(topic), serde_json::Value::Null),
    )
    .await?;
    Ok(Value::from(reply))
}

impl Mirror {
    pub(super) async fn start(broker: Arc<dyn Broker>, config: HubConfig, topic: &str) -> Result<Self> {
        let (commands, receiver) = mpsc::unbounded_channel();

        // Subscribe before fetching so no broadcast falls between the two.
        let inbound = commands.clone();
        let inbound_topic = topic.to_string();
        let broadcasts = broker
            .subscribe(
                topic,
                Arc::new(move |payload| match serde_json::from_value::<Change>(payload) {
                    Ok(change) => {
                        let _ = inbound.send(MirrorCommand::Remote(change));
                    }
                    Err(e) => warn!(topic = %inbound_topic, "ignoring malformed broadcast: {e}"),
                }),
            )
            .await?;

        let container = match Self::initial(&*broker, &config, topic).await {
            Ok(container) => container,
            Err(err) => {
                let _ = broker.unsubscribe(broadcasts).await;
                return Err(err);
            }
        };

        let applying = Arc::new(Applying::default());
        let suppressed = applying.clone();
        let outbound = commands.clone();
        let subscription = container.subscribe(move |change| {
            if suppressed.absorbs(change) {
                return;
            }
            let _ = outbound.send(MirrorCommand::Post(change.snapshot()));
        });

        let closed = Arc::new(AtomicBool::new(false));
        let worker = Follower {
            topic: topic.to_string(),
            container: container.clone(),
            broker: broker.clone(),
            config,
            applying,
            closed: closed.clone(),
            echoes: VecDeque::new(),
            commands: receiver,
        };
        tokio::spawn(worker.run());

        Ok(Self {
            topic: topic.to_string(),
            container,
            broker,
            broadcasts,
            subscription,
            commands,
            closed,
        })
    }

    async fn initial(broker: &dyn Broker, config: &HubConfig, topic: &str) -> Result<Container> {
        let snapshot = fetch(broker, config, topic).await?;
        if !(snapshot.is_list_like() || snapshot.is_namespace_like()) {
            return Err(SyncError::InvalidSnapshot {
                topic: topic.to_string(),
                kind: snapshot.type_name(),
            }
            .into());
        }
        Container::wrap(snapshot)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The local copy. Edits to it are posted to the publisher.
    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Waits until every queued post, broadcast and resync has been handled.
    pub async fn flush(&self) -> Result<()> {
        self.send(MirrorCommand::Flush)?
            .await
            .map_err(|_| SyncError::Closed(self.topic.clone()).into())
    }

    /// Queues a resynchronization with the publisher.
    pub fn resync(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SyncError::Closed(self.topic.clone()).into());
        }
        self.commands
            .send(MirrorCommand::Resync)
            .map_err(|_| SyncError::Closed(self.topic.clone()).into())
    }

    fn send(
        &self,
        command: impl FnOnce(oneshot::Sender<()>) -> MirrorCommand,
    ) -> Result<oneshot::Receiver<()>> {
        if self.is_closed() {
            return Err(SyncError::Closed(self.topic.clone()).into());
        }
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| SyncError::Closed(self.topic.clone()))?;
        Ok(rx)
    }

    /// Stops mirroring. Closing twice is a no-op.
    ///
    /// The local container keeps its current content. Results of remote
    /// calls still in flight are discarded.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.subscription.cancel();
        let _ = self.commands.send(MirrorCommand::Shutdown);
        info!(topic = %self.topic, "mirror closed");
        self.broker.unsubscribe(self.broadcasts).await
    }
}

impl fmt::Debug for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mirror")
            .field("topic", &self.topic)
            .field("container", &self.container)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Owns the remote side of a mirror.
struct Follower {
    topic: String,
    container: Container,
    broker: Arc<dyn Broker>,
    config: HubConfig,
    applying: Arc<Applying>,
    closed: Arc<AtomicBool>,
    /// Accepted posts whose broadcast has not come back yet.
    echoes: VecDeque<Change>,
    commands: mpsc::UnboundedReceiver<MirrorCommand>,
}

impl Follower {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            if self.is_closed() {
                break;
            }
            match command {
                MirrorCommand::Post(change) => self.post(change).await,
                MirrorCommand::Remote(change) => self.receive(change).await,
                MirrorCommand::Resync => self.resync().await,
                MirrorCommand::Flush(done) => {
                    let _ = done.send(());
                }
                MirrorCommand::Shutdown => break,
            }
        }
        debug!(topic = %self.topic, "follower stopped");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Applies a change from the publisher without posting it back.
    fn apply_quietly(&self, change: &Change) -> Option<Change> {
        self.applying.begin(change);
        let applied = self.container.apply(change);
        self.applying.end();
        applied
    }

    fn remember_echo(&mut self, change: Change) {
        if self.echoes.len() == ECHO_CAPACITY {
            self.echoes.pop_front();
        }
        self.echoes.push_back(change);
    }

    async fn post(&mut self, change: Change) {
        let args = match serde_json::to_value(&change) {
            Ok(args) => args,
            Err(e) => {
                warn!(topic = %self.topic, change = %change, "cannot serialize change: {e}");
                return;
            }
        };

        let reply = timed(
            &self.config,
            "post",
            self.broker.call(&post_name(&self.topic), args),
        )
        .await;
        if self.is_closed() {
            return;
        }

        match reply {
            Ok(serde_json::Value::Null) => {
                debug!(topic = %self.topic, change = %change, "post rejected, resyncing");
                self.resync().await;
            }
            Ok(reply) => match serde_json::from_value::<Change>(reply.clone()) {
                Ok(_) => {
                    trace!(topic = %self.topic, change = %change, "post accepted");
                    self.remember_echo(change);
                }
                Err(_) => {
                    let err = SyncError::UnexpectedResponse {
                        expected: "applied change or null",
                        actual: reply.to_string(),
                    };
                    warn!(topic = %self.topic, change = %change, "{err}, resyncing");
                    self.resync().await;
                }
            },
            Err(e) => warn!(topic = %self.topic, change = %change, "failed to post change: {e}"),
        }
    }

    async fn receive(&mut self, change: Change) {
        // Our own accepted post coming back. List inserts would apply twice.
        if let Some(position) = self.echoes.iter().position(|echo| *echo == change) {
            self.echoes.remove(position);
            trace!(topic = %self.topic, change = %change, "skipping echo of own post");
            return;
        }

        if self.apply_quietly(&change).is_some() {
            trace!(topic = %self.topic, change = %change, "applied broadcast");
            return;
        }

        let current = change.path().lookup(&Value::Container(self.container.clone()));
        let expected = change.new_value().cloned().unwrap_or_default();
        if equal(&current, &expected) {
            trace!(topic = %self.topic, change = %change, "broadcast already incorporated");
            return;
        }

        debug!(topic = %self.topic, change = %change, "diverged from publisher, resyncing");
        self.resync().await;
    }

    async fn resync(&self) {
        let attempts = self.config.resync_attempts();
        for attempt in 1..=attempts {
            let fetched = fetch(&*self.broker, &self.config, &self.topic).await;
            if self.is_closed() {
                return;
            }
            match fetched {
                Ok(snapshot) => {
                    self.assign_quietly(&snapshot);
                    return;
                }
                Err(e) => warn!(topic = %self.topic, attempt, "resync fetch failed: {e}"),
            }
        }
        warn!(topic = %self.topic, attempts, "giving up on resync");
    }

    /// Edits the local container until it equals `snapshot`, one change at a
    /// time so each is kept out of the post queue.
    fn assign_quietly(&self, snapshot: &Value) {
        let changes = diff(&Value::Container(self.container.clone()), snapshot);
        if changes.iter().any(|change| change.path().is_empty()) {
            warn!(
                topic = %self.topic,
                kind = snapshot.type_name(),
                "cannot assign fetched value to the mirrored {}",
                self.container.kind().as_str()
            );
            return;
        }
        let applied = changes
            .iter()
            .filter(|change| self.apply_quietly(change).is_some())
            .count();
        debug!(topic = %self.topic, changes = applied, "resynced");
    }
}
