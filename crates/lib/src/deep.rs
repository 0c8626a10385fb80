//! Deep operations over [`Value`]s: equality, copying, diffing and assignment.
//!
//! Every operation first defers to the [`DeepValue`](crate::value::DeepValue)
//! hooks of extension kinds, then falls back to structural logic. Containers
//! take part as the list or namespace they wrap; graphs of containers may be
//! cyclic, and the operations here terminate on them.

use std::{borrow::Cow, sync::Arc};

use tracing::{debug, warn};

use crate::{
    Result,
    change::Change,
    container::{Backing, ContainerId},
    path::{Key, Path},
    value::{Namespace, Value, ValueError},
};

/// A borrowed or snapshotted view of a value's structure.
enum Shape<'a> {
    List(Cow<'a, [Value]>),
    Namespace(Cow<'a, Namespace>),
    Leaf,
}

fn shape(value: &Value) -> Shape<'_> {
    match value {
        Value::List(list) => Shape::List(Cow::Borrowed(list)),
        Value::Namespace(map) => Shape::Namespace(Cow::Borrowed(map)),
        Value::Container(container) => match container.backing() {
            Backing::List(list) => Shape::List(Cow::Owned(list)),
            Backing::Namespace(map) => Shape::Namespace(Cow::Owned(map)),
        },
        _ => Shape::Leaf,
    }
}

/// Returns true if both values are the same shared object.
fn same_reference(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Container(a), Value::Container(b)) => a.ptr_eq(b),
        (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
        (Value::Custom(a), Value::Custom(b)) => {
            std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
        }
        _ => false,
    }
}

/// Deep equality.
///
/// Identical references are equal. An extension kind on the left decides for
/// itself. Otherwise lists need the same length and pairwise equal elements,
/// namespaces the same key set and pairwise equal values, and scalars must be
/// `==`. Values of different kinds are never equal.
pub fn equal(a: &Value, b: &Value) -> bool {
    Comparison::default().equal(a, b)
}

#[derive(Default)]
struct Comparison {
    /// Container pairs currently being compared further up the stack.
    assumed: Vec<(ContainerId, ContainerId)>,
}

impl Comparison {
    fn equal(&mut self, a: &Value, b: &Value) -> bool {
        if same_reference(a, b) {
            return true;
        }
        if let Value::Custom(custom) = a {
            return custom.equal(b);
        }
        if let (Value::Container(x), Value::Container(y)) = (a, b) {
            let pair = (x.id(), y.id());
            if self.assumed.contains(&pair) {
                return true;
            }
            self.assumed.push(pair);
            let result = self.structural(a, b);
            self.assumed.pop();
            return result;
        }
        self.structural(a, b)
    }

    fn structural(&mut self, a: &Value, b: &Value) -> bool {
        match (shape(a), shape(b)) {
            (Shape::List(x), Shape::List(y)) => {
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| self.equal(p, q))
            }
            (Shape::Namespace(x), Shape::Namespace(y)) => {
                x.len() == y.len()
                    && x.iter()
                        .all(|(key, p)| y.get(key).is_some_and(|q| self.equal(p, q)))
            }
            (Shape::Leaf, Shape::Leaf) => scalar_equal(a, b),
            _ => false,
        }
    }
}

fn scalar_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nothing, Value::Nothing) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Text(x), Value::Text(y)) => x == y,
        _ => false,
    }
}

/// Deep copy.
///
/// Plain lists and namespaces are cloned recursively and containers are
/// snapshotted into plain values, so the result shares nothing mutable with
/// the input. Extension kinds copy themselves; scalars and functions are
/// returned as they are.
pub fn copy(value: &Value) -> Value {
    Copier::default().copy(value)
}

#[derive(Default)]
struct Copier {
    /// Containers being copied further up the stack.
    active: Vec<ContainerId>,
}

impl Copier {
    fn copy(&mut self, value: &Value) -> Value {
        match value {
            Value::Custom(custom) => custom.copy(),
            Value::List(list) => Value::List(list.iter().map(|item| self.copy(item)).collect()),
            Value::Namespace(map) => Value::Namespace(self.copy_namespace(map)),
            Value::Container(container) => {
                let id = container.id();
                if self.active.contains(&id) {
                    warn!(container = %id, "cyclic container reference copied as nothing");
                    return Value::Nothing;
                }
                self.active.push(id);
                let copied = match container.backing() {
                    Backing::List(list) => {
                        Value::List(list.iter().map(|item| self.copy(item)).collect())
                    }
                    Backing::Namespace(map) => Value::Namespace(self.copy_namespace(&map)),
                };
                self.active.pop();
                copied
            }
            other => other.clone(),
        }
    }

    fn copy_namespace(&mut self, map: &Namespace) -> Namespace {
        map.iter()
            .map(|(key, item)| (key.clone(), self.copy(item)))
            .collect()
    }
}

/// Computes the ordered changes that turn `old` into `new`.
///
/// Applying the result to a copy of `old`, in order, yields a value equal to
/// `new`. Lists only diff the middle section left after trimming the common
/// prefix and suffix; namespaces diff key by key. Anything else, including a
/// change of kind, becomes a single replacement at the root.
pub fn diff(old: &Value, new: &Value) -> Vec<Change> {
    let mut differ = Differ::default();
    differ.diff_at(&Path::new(), old, new);
    differ.changes
}

#[derive(Default)]
struct Differ {
    /// Container pairs being diffed further up the stack. Revisiting one
    /// contributes nothing; its differences are emitted by the outer visit.
    assumed: Vec<(ContainerId, ContainerId)>,
    changes: Vec<Change>,
}

impl Differ {
    fn diff_at(&mut self, path: &Path, old: &Value, new: &Value) {
        if same_reference(old, new) {
            return;
        }
        if let Value::Custom(custom) = old {
            if let Some(changes) = custom.diff(new) {
                self.changes
                    .extend(changes.into_iter().map(|change| change.rebased(path)));
                return;
            }
        }
        if let (Value::Container(x), Value::Container(y)) = (old, new) {
            let pair = (x.id(), y.id());
            if self.assumed.contains(&pair) {
                return;
            }
            self.assumed.push(pair);
            self.structural(path, old, new);
            self.assumed.pop();
            return;
        }
        self.structural(path, old, new);
    }

    fn structural(&mut self, path: &Path, old: &Value, new: &Value) {
        match (shape(old), shape(new)) {
            (Shape::List(a), Shape::List(b)) => self.lists(path, &a, &b),
            (Shape::Namespace(a), Shape::Namespace(b)) => self.namespaces(path, &a, &b),
            _ => {
                if !equal(old, new) {
                    self.changes.push(Change::new(
                        path.clone(),
                        Some(old.clone()),
                        Some(new.clone()),
                    ));
                }
            }
        }
    }

    fn lists(&mut self, path: &Path, old: &[Value], new: &[Value]) {
        let shortest = old.len().min(new.len());
        let head = (0..shortest)
            .take_while(|&i| equal(&old[i], &new[i]))
            .count();
        let tail = (0..shortest - head)
            .take_while(|&i| equal(&old[old.len() - 1 - i], &new[new.len() - 1 - i]))
            .count();

        let old_middle = old.len() - head - tail;
        let new_middle = new.len() - head - tail;
        let paired = old_middle.min(new_middle);

        for i in 0..paired {
            let index = head + i;
            self.diff_at(&path.clone().push(index), &old[index], &new[index]);
        }
        // Inserts go front to back and deletes back to front so every change
        // still addresses the right element after the ones before it applied.
        for i in paired..new_middle {
            let index = head + i;
            self.changes
                .push(Change::insert(path.clone().push(index), new[index].clone()));
        }
        for i in (paired..old_middle).rev() {
            let index = head + i;
            self.changes
                .push(Change::delete(path.clone().push(index), old[index].clone()));
        }
    }

    fn namespaces(&mut self, path: &Path, old: &Namespace, new: &Namespace) {
        let nothing = Value::Nothing;
        for (key, value) in old {
            let next = new.get(key).unwrap_or(&nothing);
            self.diff_at(&path.clone().push(Key::from(key)), value, next);
        }
        for (key, value) in new {
            if !old.contains_key(key) {
                self.changes
                    .push(Change::insert(path.clone().push(Key::from(key)), value.clone()));
            }
        }
    }
}

/// Edits `dest` in place until it equals `src`.
///
/// Returns the changes that applied. Fails when the values cannot be
/// reconciled by in-place edits, i.e. when their diff is a single replacement
/// of the whole value.
pub fn assign(dest: &mut Value, src: &Value) -> Result<Vec<Change>> {
    let changes = diff(dest, src);
    if let [only] = changes.as_slice() {
        if only.path().is_empty() {
            return Err(ValueError::IncompatibleAssign {
                dest_kind: dest.type_name(),
                source_kind: src.type_name(),
            }
            .into());
        }
    }

    let mut applied = Vec::with_capacity(changes.len());
    for change in changes {
        match change.apply(dest) {
            Some(change) => applied.push(change),
            None => debug!(change = %change, "assign skipped a change that no longer applies"),
        }
    }
    Ok(applied)
}
