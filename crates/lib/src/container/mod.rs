//! Reactive containers.
//!
//! A [`Container`] wraps a namespace or a list and notifies subscribers of
//! every change made through it. Containers nest: storing a plain list or
//! namespace into a container wraps it (recursively) into fresh containers,
//! and storing a container stores a shared reference to it. A container may
//! therefore sit under several parents, including itself or its own
//! descendants.
//!
//! Every container keeps a parent table recording, for each parent, the key it
//! is stored under there. When a container changes, the change is delivered to
//! its own subscribers and then to each parent with the key prepended, and so
//! on upward. Each container is notified at most once per originating
//! mutation, which is what keeps propagation finite in cyclic graphs.
//!
//! ```
//! use livestate::{Container, Value};
//! use std::sync::{Arc, Mutex};
//!
//! let root = Container::namespace();
//! root.set("user", Value::from(serde_json::json!({"name": "Alice"}))).unwrap();
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let subscription = root.subscribe(move |change| {
//!     sink.lock().unwrap().push(change.path().to_string());
//! });
//!
//! let user = root.get("user");
//! user.as_container().unwrap().set("name", "Bob").unwrap();
//! assert_eq!(*seen.lock().unwrap(), vec!["user.name".to_string()]);
//! subscription.cancel();
//! ```
//!
//! Mutation and propagation are synchronous: `set` returns once every
//! subscriber and ancestor has been notified. Containers are `Send + Sync`,
//! but writes to one container graph must be serialized by the caller.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::{
        Arc, Mutex, RwLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::{debug, trace};

use crate::{
    Result,
    change::{self, Change, Edit, Slot},
    deep::{self, equal},
    path::{Key, Path},
    value::{Namespace, Value, ValueError},
};

mod subscription;

pub use subscription::{Subscription, SubscriptionId};

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(u64);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The shape a container wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Namespace,
    List,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Namespace => "namespace",
            ContainerKind::List => "list",
        }
    }
}

/// The value a container owns.
#[derive(Debug, Clone)]
pub(crate) enum Backing {
    Namespace(Namespace),
    List(Vec<Value>),
}

impl Backing {
    fn kind(&self) -> ContainerKind {
        match self {
            Backing::Namespace(_) => ContainerKind::Namespace,
            Backing::List(_) => ContainerKind::List,
        }
    }

    /// Finds where `child` is stored.
    fn locate(&self, child: &Container) -> Option<Key> {
        let holds = |value: &Value| matches!(value, Value::Container(c) if c.ptr_eq(child));
        match self {
            Backing::Namespace(map) => map
                .iter()
                .find(|(_, value)| holds(*value))
                .map(|(name, _)| Key::from(name)),
            Backing::List(list) => list.iter().position(holds).map(Key::Index),
        }
    }
}

pub(crate) type Callback = Arc<dyn Fn(&Change) + Send + Sync>;

/// A non-owning reference to a parent and the key this container has there.
struct ParentLink {
    parent: Weak<Inner>,
    key: Key,
}

struct Inner {
    id: ContainerId,
    kind: ContainerKind,
    state: RwLock<Backing>,
    parents: Mutex<BTreeMap<ContainerId, ParentLink>>,
    callbacks: Mutex<Vec<(SubscriptionId, Callback)>>,
}

/// A slot mutation, performed under the container's write lock.
enum Op {
    Put(Key, Value),
    Insert(usize, Value),
    Remove(Key),
}

/// Shared handle to a reactive namespace or list.
///
/// Cloning the handle does not copy the container.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

impl Container {
    /// Creates an empty namespace container.
    pub fn namespace() -> Self {
        Self::from_backing(Backing::Namespace(Namespace::new()))
    }

    /// Creates an empty list container.
    pub fn list() -> Self {
        Self::from_backing(Backing::List(Vec::new()))
    }

    /// Wraps a plain list or namespace, recursively wrapping nested ones.
    ///
    /// A container value is returned as is. Namespace entries holding
    /// [`Value::Nothing`] are dropped.
    ///
    /// # Errors
    /// [`ValueError::TypeMismatch`] for anything that is not list- or
    /// namespace-shaped, and [`ValueError::InvalidValue`] when a nested value
    /// cannot be stored (functions, or `Nothing` inside a list).
    pub fn wrap(value: Value) -> Result<Container> {
        match value {
            Value::Container(container) => Ok(container),
            Value::List(items) => {
                let items = items
                    .into_iter()
                    .map(storable)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::from_backing(Backing::List(items)))
            }
            Value::Namespace(map) => {
                let map = map
                    .into_iter()
                    .filter(|(_, value)| !value.is_nothing())
                    .map(|(name, value)| storable(value).map(|value| (name, value)))
                    .collect::<Result<Namespace>>()?;
                Ok(Self::from_backing(Backing::Namespace(map)))
            }
            other => Err(ValueError::TypeMismatch {
                expected: "list or namespace",
                actual: other.type_name(),
            }
            .into()),
        }
    }

    fn from_backing(backing: Backing) -> Self {
        let container = Container {
            inner: Arc::new(Inner {
                id: ContainerId(NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed)),
                kind: backing.kind(),
                state: RwLock::new(backing),
                parents: Mutex::new(BTreeMap::new()),
                callbacks: Mutex::new(Vec::new()),
            }),
        };

        {
            let state = container.inner.state.read().unwrap();
            let children: Vec<(Key, &Value)> = match &*state {
                Backing::Namespace(map) => map
                    .iter()
                    .map(|(name, value)| (Key::from(name), value))
                    .collect(),
                Backing::List(list) => list
                    .iter()
                    .enumerate()
                    .map(|(index, value)| (Key::Index(index), value))
                    .collect(),
            };
            for (key, value) in children {
                if let Value::Container(child) = value {
                    child.link_parent(&container, key);
                }
            }
        }

        container
    }

    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    pub fn kind(&self) -> ContainerKind {
        self.inner.kind
    }

    pub fn is_list(&self) -> bool {
        self.inner.kind == ContainerKind::List
    }

    /// Returns true if both handles refer to the same container.
    pub fn ptr_eq(&self, other: &Container) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of entries (fields or elements).
    pub fn len(&self) -> usize {
        match &*self.inner.state.read().unwrap() {
            Backing::Namespace(map) => map.len(),
            Backing::List(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the value at `key`, or [`Value::Nothing`].
    ///
    /// Nested containers are returned as shared handles.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        match (&*self.inner.state.read().unwrap(), &key) {
            (Backing::Namespace(map), Key::Name(name)) => {
                map.get(name).cloned().unwrap_or_default()
            }
            (Backing::List(list), Key::Index(index)) => {
                list.get(*index).cloned().unwrap_or_default()
            }
            _ => Value::Nothing,
        }
    }

    /// Looks up a nested value through this container.
    pub fn get_path(&self, path: impl Into<Path>) -> Value {
        path.into().lookup(&Value::Container(self.clone()))
    }

    /// Field names in insertion order, or list indices.
    pub fn keys(&self) -> Vec<Key> {
        match &*self.inner.state.read().unwrap() {
            Backing::Namespace(map) => map.keys().map(Key::from).collect(),
            Backing::List(list) => (0..list.len()).map(Key::Index).collect(),
        }
    }

    /// A plain deep copy of the current content.
    pub fn snapshot(&self) -> Value {
        deep::copy(&Value::Container(self.clone()))
    }

    /// Current parents and the key this container has in each.
    pub fn parents(&self) -> Vec<(Container, Key)> {
        let mut parents = self.inner.parents.lock().unwrap();
        parents.retain(|_, link| link.parent.strong_count() > 0);
        parents
            .values()
            .filter_map(|link| {
                link.parent.upgrade().map(|inner| (Container { inner }, link.key.clone()))
            })
            .collect()
    }

    pub(crate) fn backing(&self) -> Backing {
        self.inner.state.read().unwrap().clone()
    }

    /// Stores `value` at `key`.
    ///
    /// Plain lists and namespaces are wrapped into new containers; storing
    /// [`Value::Nothing`] deletes the key. On a list, `key` may be one past
    /// the end to append. Storing a value equal to the current one does
    /// nothing and returns `Ok(None)`.
    ///
    /// # Errors
    /// Functions cannot be stored, name keys do not address lists, index keys
    /// do not address namespaces, and list indices past the end are rejected.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<Option<Change>> {
        let key = key.into();
        let value = value.into();
        if value.is_nothing() {
            return self.delete(key);
        }
        self.check_key(&key)?;

        let stored = storable(value)?;
        let current = self.get(key.clone());
        if equal(&current, &stored) {
            trace!(container = %self.id(), key = %key, "set to an equal value is a no-op");
            return Ok(None);
        }

        let op = match key {
            Key::Index(index) => {
                let len = self.len();
                if index < len {
                    Op::Put(Key::Index(index), stored.clone())
                } else if index == len {
                    Op::Insert(index, stored.clone())
                } else {
                    return Err(ValueError::IndexOutOfRange { index, len }.into());
                }
            }
            name => Op::Put(name, stored.clone()),
        };
        Ok(Some(self.commit_and_dispatch(op, Some(stored))))
    }

    /// Removes `key`. Missing keys are a no-op returning `Ok(None)`.
    ///
    /// Removing a list element shifts the following elements down.
    pub fn delete(&self, key: impl Into<Key>) -> Result<Option<Change>> {
        let key = key.into();
        self.check_key(&key)?;
        if self.get(key.clone()).is_nothing() {
            return Ok(None);
        }
        Ok(Some(self.commit_and_dispatch(Op::Remove(key), None)))
    }

    /// Inserts `value` into a list container at `index`, shifting the
    /// following elements up. `index` may equal the length to append.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> Result<Change> {
        self.check_key(&Key::Index(index))?;
        let len = self.len();
        if index > len {
            return Err(ValueError::IndexOutOfRange { index, len }.into());
        }
        let value = value.into();
        if value.is_nothing() {
            return Err(ValueError::InvalidValue { kind: "nothing" }.into());
        }
        let stored = storable(value)?;
        Ok(self.commit_and_dispatch(Op::Insert(index, stored.clone()), Some(stored)))
    }

    /// Appends `value` to a list container.
    pub fn push(&self, value: impl Into<Value>) -> Result<Change> {
        self.insert(self.len(), value)
    }

    /// Applies a change addressed relative to this container.
    ///
    /// See [`Change::apply`]. Successful application is dispatched like any
    /// local mutation.
    pub fn apply(&self, change: &Change) -> Option<Change> {
        change.apply(&mut Value::Container(self.clone()))
    }

    /// Edits this container in place until it equals `src`.
    ///
    /// See [`deep::assign`].
    pub fn assign(&self, src: &Value) -> Result<Vec<Change>> {
        deep::assign(&mut Value::Container(self.clone()), src)
    }

    /// Registers `callback` for every change at or below this container.
    pub fn subscribe(&self, callback: impl Fn(&Change) + Send + Sync + 'static) -> Subscription {
        let id = SubscriptionId::next();
        self.inner
            .callbacks
            .lock()
            .unwrap()
            .push((id, Arc::new(callback)));
        Subscription::new(Arc::downgrade(&self.inner), id)
    }

    fn check_key(&self, key: &Key) -> Result<()> {
        match (self.kind(), key) {
            (ContainerKind::Namespace, Key::Name(_)) | (ContainerKind::List, Key::Index(_)) => {
                Ok(())
            }
            (kind, key) => Err(ValueError::KeyKind {
                container: kind.as_str(),
                key: key.to_string(),
            }
            .into()),
        }
    }

    /// Applies a change whose parent is `route` below this container.
    pub(crate) fn apply_within(&self, route: &[Key], key: &Key, change: &Change) -> bool {
        match route.split_first() {
            Some((first, rest)) => {
                let mut child = self.get(first.clone());
                change::apply_within(&mut child, rest, key, change)
            }
            None => self.apply_here(key, change),
        }
    }

    fn apply_here(&self, key: &Key, change: &Change) -> bool {
        let slot = match (self.kind(), key) {
            (ContainerKind::Namespace, Key::Name(_)) => Slot::Field,
            (ContainerKind::List, Key::Index(index)) => Slot::Element {
                index: *index,
                len: self.len(),
            },
            _ => return false,
        };

        let current = self.get(key.clone());
        let Some(edit) = change::plan(change, slot, &current) else {
            return false;
        };

        let prepare = |new: &Value| match storable(new.clone()) {
            Ok(stored) => Some(stored),
            Err(err) => {
                debug!(container = %self.id(), error = %err, "change carries a value that cannot be stored");
                None
            }
        };
        let (op, stored) = match edit {
            Edit::Overwrite(new) => {
                let Some(stored) = prepare(new) else {
                    return false;
                };
                (Op::Put(key.clone(), stored.clone()), Some(stored))
            }
            Edit::Insert(new) => {
                let Some(stored) = prepare(new) else {
                    return false;
                };
                let op = match key {
                    Key::Index(index) => Op::Insert(*index, stored.clone()),
                    name => Op::Put(name.clone(), stored.clone()),
                };
                (op, Some(stored))
            }
            Edit::Remove => (Op::Remove(key.clone()), None),
        };

        self.commit_and_dispatch(op, stored);
        true
    }

    fn commit_and_dispatch(&self, op: Op, stored: Option<Value>) -> Change {
        let key = match &op {
            Op::Put(key, _) | Op::Remove(key) => key.clone(),
            Op::Insert(index, _) => Key::Index(*index),
        };
        let previous = self.commit(op);
        let change = Change::new(Path::from(key), Some(previous), stored);
        self.dispatch(&change);
        change
    }

    /// Mutates the backing value and re-establishes the parent tables of the
    /// affected children before the write lock is released.
    ///
    /// Returns the value previously stored in the slot.
    fn commit(&self, op: Op) -> Value {
        let mut state = self.inner.state.write().unwrap();

        let (previous, new_child, shifted_from) = match (&mut *state, op) {
            (Backing::Namespace(map), Op::Put(key, value)) => {
                let name = key.as_name().unwrap_or_default().to_string();
                let previous = map.insert(name, value.clone()).unwrap_or_default();
                (previous, Some((key, value)), None)
            }
            (Backing::Namespace(map), Op::Remove(key)) => {
                let previous = key
                    .as_name()
                    .and_then(|name| map.shift_remove(name))
                    .unwrap_or_default();
                (previous, None, None)
            }
            (Backing::List(list), Op::Put(key, value)) => {
                let index = key.as_index().unwrap_or(usize::MAX);
                match list.get_mut(index) {
                    Some(slot) => {
                        let previous = std::mem::replace(slot, value.clone());
                        (previous, Some((key, value)), None)
                    }
                    None => (Value::Nothing, None, None),
                }
            }
            (Backing::List(list), Op::Insert(index, value)) => {
                let index = index.min(list.len());
                list.insert(index, value);
                (Value::Nothing, None, Some(index))
            }
            (Backing::List(list), Op::Remove(key)) => match key.as_index() {
                Some(index) if index < list.len() => (list.remove(index), None, Some(index)),
                _ => (Value::Nothing, None, None),
            },
            (Backing::Namespace(_), Op::Insert(..)) => (Value::Nothing, None, None),
        };

        if let Some((key, Value::Container(child))) = new_child {
            child.link_parent(self, key);
        }
        if let (Backing::List(list), Some(from)) = (&*state, shifted_from) {
            for (index, value) in list.iter().enumerate().skip(from) {
                if let Value::Container(child) = value {
                    child.link_parent(self, Key::Index(index));
                }
            }
        }
        if let Value::Container(old_child) = &previous {
            match state.locate(old_child) {
                Some(key) => old_child.link_parent(self, key),
                None => old_child.unlink_parent(self),
            }
        }

        previous
    }

    fn link_parent(&self, parent: &Container, key: Key) {
        self.inner.parents.lock().unwrap().insert(
            parent.id(),
            ParentLink {
                parent: Arc::downgrade(&parent.inner),
                key,
            },
        );
    }

    fn unlink_parent(&self, parent: &Container) {
        self.inner.parents.lock().unwrap().remove(&parent.id());
    }

    fn dispatch(&self, change: &Change) {
        let mut reached = HashSet::new();
        self.deliver(change, &mut reached);
    }

    /// Delivers `change` here, then to every parent with the parent's key
    /// prepended.
    ///
    /// `reached` holds every container this propagation has already been
    /// delivered to, along all branches; a container is never notified twice
    /// for the same originating mutation.
    fn deliver(&self, change: &Change, reached: &mut HashSet<ContainerId>) {
        if !reached.insert(self.id()) {
            trace!(container = %self.id(), path = %change.path(), "already notified");
            return;
        }
        trace!(container = %self.id(), change = %change, "delivering change");

        let callbacks: Vec<Callback> = self
            .inner
            .callbacks
            .lock()
            .unwrap()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback(change);
        }

        for (parent, key) in self.parents() {
            parent.deliver(&change.prefixed(key), reached);
        }
    }
}

fn remove_callback(inner: &Inner, id: SubscriptionId) -> bool {
    let mut callbacks = inner.callbacks.lock().unwrap();
    let before = callbacks.len();
    callbacks.retain(|(existing, _)| *existing != id);
    callbacks.len() != before
}

fn has_callback(inner: &Inner, id: SubscriptionId) -> bool {
    inner
        .callbacks
        .lock()
        .unwrap()
        .iter()
        .any(|(existing, _)| *existing == id)
}

/// Converts a value into something a container slot can hold.
fn storable(value: Value) -> Result<Value> {
    match value {
        Value::Function(_) | Value::Nothing => Err(ValueError::InvalidValue {
            kind: value.type_name(),
        }
        .into()),
        Value::List(_) | Value::Namespace(_) => Container::wrap(value).map(Value::Container),
        other => Ok(other),
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}
