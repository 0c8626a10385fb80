//! The value model shared by every other module.
//!
//! [`Value`] is a closed set of kinds: absence ([`Value::Nothing`]), scalars,
//! plain lists and namespaces, opaque functions, live [`Container`]
//! references, and extension kinds implementing [`DeepValue`].
//!
//! # Plain and live structure
//!
//! `List` and `Namespace` are plain, owned data: cloning them copies them.
//! `Container` is a handle to shared, reactive structure: cloning it clones the
//! handle, and two clones are the same container. The deep operations in
//! [`crate::deep`] treat a container like the list or namespace it wraps, so a
//! namespace container and a plain namespace with equal contents are equal.
//!
//! # Nothing and Null
//!
//! `Nothing` means "absent": a missing key, a failed lookup, the missing side of
//! an insert or delete [`Change`]. It is never stored in a container.
//! `Null` is an ordinary value (JSON `null`) and may be stored anywhere.
//!
//! ```
//! # use livestate::Value;
//! let value = Value::from(serde_json::json!({"name": "Alice", "tags": ["a", "b"]}));
//! assert!(value.child(&"name".into()) == "Alice");
//! assert!(value.child(&"missing".into()).is_nothing());
//! ```

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{change::Change, container::Container, path::Key};

mod errors;

pub use errors::ValueError;

/// Insertion-ordered string-keyed mapping used for plain namespaces.
pub type Namespace = IndexMap<String, Value>;

/// Extension point for value kinds with their own deep semantics.
///
/// The deep operations check for these hooks before falling back to structural
/// logic. Only [`DeepValue::copy`] is required; the other hooks default to
/// "not supported", in which case the value compares by identity, diffs as a
/// whole-value replacement and rejects changes addressed inside it.
pub trait DeepValue: fmt::Debug + Send + Sync {
    /// Name used in error messages and logs.
    fn type_name(&self) -> &'static str;

    /// Structural equality against any other value.
    ///
    /// Identity has already been checked by the caller.
    fn equal(&self, _other: &Value) -> bool {
        false
    }

    /// Produces an independent copy.
    fn copy(&self) -> Value;

    /// Changes turning `self` into `new`, or `None` to fall back to a
    /// whole-value replacement.
    fn diff(&self, _new: &Value) -> Option<Vec<Change>> {
        None
    }

    /// Applies a change whose path is relative to this value.
    ///
    /// Returns `true` when the change was applied.
    fn apply_change(&self, _change: &Change) -> bool {
        false
    }

    /// JSON form used when the value crosses the wire.
    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// An opaque callable, compared by identity.
#[derive(Clone)]
pub struct Function(Arc<dyn Fn(&[Value]) -> Value + Send + Sync>);

impl Function {
    pub fn new(f: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> Self {
        Function(Arc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    /// Returns true if both handles refer to the same function.
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({:p})", Arc::as_ptr(&self.0))
    }
}

/// Values that can be stored, diffed and replicated.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent or undefined
    #[default]
    Nothing,
    /// Explicit null
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Namespace(Namespace),
    Function(Function),
    /// Extension kind with its own deep semantics
    Custom(Arc<dyn DeepValue>),
    /// Shared handle to a live reactive container
    Container(Container),
}

impl Value {
    /// Creates an empty plain namespace.
    pub fn namespace() -> Self {
        Value::Namespace(Namespace::new())
    }

    /// Creates an empty plain list.
    pub fn list() -> Self {
        Value::List(Vec::new())
    }

    /// Returns the kind name. Containers report the shape they wrap.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nothing => "nothing",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Namespace(_) => "namespace",
            Value::Function(_) => "function",
            Value::Custom(custom) => custom.type_name(),
            Value::Container(container) => container.kind().as_str(),
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Value::Nothing)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for scalars: null, bool, number and text.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::Text(_)
        )
    }

    /// Returns true for plain lists and list containers.
    pub fn is_list_like(&self) -> bool {
        match self {
            Value::List(_) => true,
            Value::Container(container) => container.is_list(),
            _ => false,
        }
    }

    /// Returns true for plain namespaces and namespace containers.
    pub fn is_namespace_like(&self) -> bool {
        match self {
            Value::Namespace(_) => true,
            Value::Container(container) => !container.is_list(),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the number if it is integral and fits in an `i64`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_namespace(&self) -> Option<&Namespace> {
        match self {
            Value::Namespace(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_namespace_mut(&mut self) -> Option<&mut Namespace> {
        match self {
            Value::Namespace(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Value::Container(container) => Some(container),
            _ => None,
        }
    }

    /// Returns the child at `key`, or [`Value::Nothing`].
    ///
    /// Name keys only select namespace fields and index keys only select list
    /// elements.
    pub fn child(&self, key: &Key) -> Value {
        match (self, key) {
            (Value::Namespace(map), Key::Name(name)) => {
                map.get(name).cloned().unwrap_or_default()
            }
            (Value::List(list), Key::Index(index)) => {
                list.get(*index).cloned().unwrap_or_default()
            }
            (Value::Container(container), key) => container.get(key.clone()),
            _ => Value::Nothing,
        }
    }

    /// Converts to JSON. Containers are snapshotted first; functions and
    /// absent values become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Container(_) => plain_to_json(&crate::deep::copy(self)),
            other => plain_to_json(other),
        }
    }
}

fn plain_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Nothing | Value::Null | Value::Function(_) => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => number_to_json(*n),
        Value::Text(s) => Json::String(s.clone()),
        Value::List(list) => Json::Array(list.iter().map(Value::to_json).collect()),
        Value::Namespace(map) => Json::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        ),
        Value::Custom(custom) => custom.to_json(),
        Value::Container(_) => value.to_json(),
    }
}

/// Integral numbers inside the exactly-representable range are emitted as JSON
/// integers so they read back the way they were written.
fn number_to_json(n: f64) -> serde_json::Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_992.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nothing => write!(f, "<nothing>"),
            Value::Function(func) => write!(f, "{func:?}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        crate::deep::equal(self, other)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::Text(s),
            Json::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            Json::Object(fields) => Value::Namespace(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Namespace> for Value {
    fn from(value: Namespace) -> Self {
        Value::Namespace(value)
    }
}

impl From<Container> for Value {
    fn from(value: Container) -> Self {
        Value::Container(value)
    }
}

impl From<&Container> for Value {
    fn from(value: &Container) -> Self {
        Value::Container(value.clone())
    }
}

impl From<Function> for Value {
    fn from(value: Function) -> Self {
        Value::Function(value)
    }
}

impl From<Arc<dyn DeepValue>> for Value {
    fn from(value: Arc<dyn DeepValue>) -> Self {
        Value::Custom(value)
    }
}

// Direct comparisons with primitives for ergonomic assertions
impl PartialEq<str> for Value {
    fn eq(&self, other: &str) -> bool {
        self.as_text() == Some(other)
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl PartialEq<f64> for Value {
    fn eq(&self, other: &f64) -> bool {
        self.as_number() == Some(*other)
    }
}

impl PartialEq<i32> for Value {
    fn eq(&self, other: &i32) -> bool {
        self.as_number() == Some(*other as f64)
    }
}

impl PartialEq<bool> for Value {
    fn eq(&self, other: &bool) -> bool {
        self.as_bool() == Some(*other)
    }
}
