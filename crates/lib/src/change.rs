//! Atomic, preconditioned mutations.
//!
//! A [`Change`] records a location and the values expected before and after.
//! Which sides are present decides what it does:
//!
//! | old | new | kind |
//! |-----|-----|------|
//! | yes | yes | [`ChangeKind::Set`] |
//! | no  | yes | [`ChangeKind::Insert`] |
//! | yes | no  | [`ChangeKind::Delete`] |
//! | no  | no  | [`ChangeKind::Noop`] |
//!
//! [`Change::apply`] only succeeds when the target still looks the way the
//! change expects. A failed application is an ordinary outcome (some other
//! writer got there first) and is reported as `None`, never as an error.
//!
//! On the wire a change is `{"path": [...], "old": v, "new": v}` with absent
//! sides omitted entirely.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::trace;

use crate::{
    deep::{copy, equal},
    path::{Key, Path},
    value::Value,
};

/// The shape of a [`Change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Set,
    Insert,
    Delete,
    Noop,
}

/// A single insert, delete or overwrite at a [`Path`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    path: Path,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    old: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    new: Option<Value>,
}

/// A field that is present on the wire is a value, even when it is `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Absent sides are normalized so `Some(Value::Nothing)` never exists.
fn side(value: Option<Value>) -> Option<Value> {
    value.filter(|value| !value.is_nothing())
}

impl Change {
    pub fn new(path: impl Into<Path>, old: Option<Value>, new: Option<Value>) -> Self {
        Self {
            path: path.into(),
            old: side(old),
            new: side(new),
        }
    }

    pub fn set(path: impl Into<Path>, old: impl Into<Value>, new: impl Into<Value>) -> Self {
        Self::new(path, Some(old.into()), Some(new.into()))
    }

    pub fn insert(path: impl Into<Path>, new: impl Into<Value>) -> Self {
        Self::new(path, None, Some(new.into()))
    }

    pub fn delete(path: impl Into<Path>, old: impl Into<Value>) -> Self {
        Self::new(path, Some(old.into()), None)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn old(&self) -> Option<&Value> {
        self.old.as_ref()
    }

    pub fn new_value(&self) -> Option<&Value> {
        self.new.as_ref()
    }

    pub fn into_parts(self) -> (Path, Option<Value>, Option<Value>) {
        (self.path, self.old, self.new)
    }

    pub fn kind(&self) -> ChangeKind {
        match (&self.old, &self.new) {
            (Some(_), Some(_)) => ChangeKind::Set,
            (None, Some(_)) => ChangeKind::Insert,
            (Some(_), None) => ChangeKind::Delete,
            (None, None) => ChangeKind::Noop,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.kind() == ChangeKind::Noop
    }

    /// The same change seen from one level up, below `key`.
    pub fn prefixed(&self, key: Key) -> Change {
        let mut keys = Vec::with_capacity(self.path.len() + 1);
        keys.push(key);
        keys.extend_from_slice(self.path.keys());
        Change {
            path: keys.into(),
            old: self.old.clone(),
            new: self.new.clone(),
        }
    }

    /// The same change seen from the value `base` is relative to.
    pub fn rebased(self, base: &Path) -> Change {
        Change {
            path: base.clone().join(self.path),
            ..self
        }
    }

    /// Deep-copies both sides so the change no longer refers to live
    /// containers.
    pub fn snapshot(&self) -> Change {
        Change {
            path: self.path.clone(),
            old: side(self.old.as_ref().map(copy)),
            new: side(self.new.as_ref().map(copy)),
        }
    }

    /// Applies this change to `target` if its preconditions hold.
    ///
    /// The parent is found by looking up everything but the last key. When the
    /// parent is a container or an extension kind, it applies the change
    /// itself. Otherwise a name key needs a namespace parent and an index key
    /// needs a list parent:
    ///
    /// - set: the current value must equal `old` and differ from `new`; for
    ///   lists the index must be in range.
    /// - insert: a namespace key must be absent; a list index may be at most
    ///   the length (appending).
    /// - delete: the key must be present with a value equal to `old`.
    ///
    /// Returns the change on success and `None` when anything does not match.
    /// Root-level changes (empty path) never apply in place.
    pub fn apply(&self, target: &mut Value) -> Option<Change> {
        let Some((key, route)) = self.path.keys().split_last() else {
            trace!(change = %self, "root-level change cannot be applied in place");
            return None;
        };

        if apply_within(target, route, key, self) {
            Some(self.clone())
        } else {
            trace!(change = %self, "change preconditions not met");
            None
        }
    }

    /// Re-expresses this change relative to `base`.
    ///
    /// - If `base` leads to (or is) the changed location, the result keeps the
    ///   remaining path and both sides.
    /// - If the change replaced an ancestor of `base`, the result is a
    ///   root-level change holding what `base` pointed at before and after.
    ///   Either side may be absent.
    /// - Otherwise the change does not touch `base` and the result is `None`.
    pub fn sub_change(&self, base: &Path) -> Option<Change> {
        if let Some(rest) = self.path.strip_prefix(base) {
            return Some(Change {
                path: rest,
                old: self.old.clone(),
                new: self.new.clone(),
            });
        }

        let rest = base.strip_prefix(&self.path)?;
        Some(Change::new(
            Path::new(),
            self.old.as_ref().map(|old| rest.lookup(old)),
            self.new.as_ref().map(|new| rest.lookup(new)),
        ))
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() {
            "(root)".to_string()
        } else {
            self.path.to_string()
        };
        match (&self.old, &self.new) {
            (Some(old), Some(new)) => write!(f, "set {path}: {old} -> {new}"),
            (None, Some(new)) => write!(f, "insert {path}: {new}"),
            (Some(old), None) => write!(f, "delete {path}: {old}"),
            (None, None) => write!(f, "noop {path}"),
        }
    }
}

/// Where an applicable change lands in its parent.
pub(crate) enum Edit<'a> {
    Overwrite(&'a Value),
    Insert(&'a Value),
    Remove,
}

/// The parent slot a change is addressed to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Slot {
    Field,
    Element { index: usize, len: usize },
}

/// Checks a change against the current content of its parent slot.
///
/// `current` is [`Value::Nothing`] when the slot does not exist.
pub(crate) fn plan<'a>(change: &'a Change, slot: Slot, current: &Value) -> Option<Edit<'a>> {
    match (&change.old, &change.new) {
        (Some(old), Some(new)) => {
            if let Slot::Element { index, len } = slot {
                if index >= len {
                    return None;
                }
            }
            (equal(old, current) && !equal(new, current)).then_some(Edit::Overwrite(new))
        }
        (None, Some(new)) => match slot {
            Slot::Field => current.is_nothing().then_some(Edit::Insert(new)),
            Slot::Element { index, len } => (index <= len).then_some(Edit::Insert(new)),
        },
        (Some(old), None) => match slot {
            Slot::Field => (!current.is_nothing() && equal(old, current)).then_some(Edit::Remove),
            Slot::Element { index, len } => {
                (index < len && equal(old, current)).then_some(Edit::Remove)
            }
        },
        (None, None) => None,
    }
}

pub(crate) fn apply_within(node: &mut Value, route: &[Key], key: &Key, change: &Change) -> bool {
    match node {
        Value::Container(container) => return container.apply_within(route, key, change),
        Value::Custom(custom) => {
            let relative = Change {
                path: Path::from(route).push(key.clone()),
                old: change.old.clone(),
                new: change.new.clone(),
            };
            return custom.apply_change(&relative);
        }
        _ => {}
    }

    match route.split_first() {
        Some((first, rest)) => match child_mut(node, first) {
            Some(child) => apply_within(child, rest, key, change),
            None => false,
        },
        None => apply_to_parent(node, key, change),
    }
}

fn child_mut<'a>(node: &'a mut Value, key: &Key) -> Option<&'a mut Value> {
    match (node, key) {
        (Value::Namespace(map), Key::Name(name)) => map.get_mut(name),
        (Value::List(list), Key::Index(index)) => list.get_mut(*index),
        _ => None,
    }
}

fn apply_to_parent(parent: &mut Value, key: &Key, change: &Change) -> bool {
    let nothing = Value::Nothing;
    match (parent, key) {
        (Value::Namespace(map), Key::Name(name)) => {
            let current = map.get(name).unwrap_or(&nothing);
            match plan(change, Slot::Field, current) {
                Some(Edit::Overwrite(new) | Edit::Insert(new)) => {
                    map.insert(name.clone(), new.clone());
                    true
                }
                Some(Edit::Remove) => map.shift_remove(name).is_some(),
                None => false,
            }
        }
        (Value::List(list), Key::Index(index)) => {
            let index = *index;
            let slot = Slot::Element {
                index,
                len: list.len(),
            };
            let current = list.get(index).unwrap_or(&nothing);
            match plan(change, slot, current) {
                Some(Edit::Overwrite(new)) => {
                    list[index] = new.clone();
                    true
                }
                Some(Edit::Insert(new)) => {
                    list.insert(index, new.clone());
                    true
                }
                Some(Edit::Remove) => {
                    list.remove(index);
                    true
                }
                None => false,
            }
        }
        _ => false,
    }
}
