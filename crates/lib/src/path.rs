//! Paths locating a value inside nested namespaces and lists.
//!
//! A [`Path`] is an ordered sequence of [`Key`]s. Name keys select a field of a
//! namespace, index keys select an element of a list. Paths have a textual form
//! where names are separated by dots and indices are written in brackets:
//!
//! ```rust
//! use livestate::path::{Key, Path};
//!
//! let path: Path = "users[3].profile.name".parse().unwrap();
//! assert_eq!(
//!     path.keys(),
//!     &[
//!         Key::from("users"),
//!         Key::Index(3),
//!         Key::from("profile"),
//!         Key::from("name"),
//!     ]
//! );
//! assert_eq!(path.to_string(), "users[3].profile.name");
//! ```
//!
//! Parsing never fails. Empty segments are dropped and bracket contents that
//! are not an integer are kept as a name, the same way the builder methods
//! normalize their input.

use std::{
    fmt,
    ops::{Bound, Deref, RangeBounds},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A single step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// Position inside a list.
    Index(usize),
    /// Field of a namespace.
    Name(String),
}

impl Key {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(name) => Some(name),
            Key::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(index) => Some(*index),
            Key::Name(_) => None,
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Key::Index(_))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(index) => write!(f, "[{index}]"),
            Key::Name(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<&String> for Key {
    fn from(name: &String) -> Self {
        Key::Name(name.clone())
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<u32> for Key {
    fn from(index: u32) -> Self {
        Key::Index(index as usize)
    }
}

/// Negative indices cannot address anything; they map to `usize::MAX`, which
/// is out of range for every list.
impl From<i32> for Key {
    fn from(index: i32) -> Self {
        Key::Index(usize::try_from(index).unwrap_or(usize::MAX))
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

/// An ordered, possibly empty sequence of keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path {
    keys: Vec<Key>,
}

impl Path {
    /// Creates the empty path, which refers to the root value itself.
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Parses the textual form.
    pub fn parse(text: &str) -> Self {
        let mut keys = Vec::new();
        let mut name = String::new();
        let mut chars = text.chars();

        fn flush(name: &mut String, keys: &mut Vec<Key>) {
            if !name.is_empty() {
                keys.push(Key::Name(std::mem::take(name)));
            }
        }

        while let Some(c) = chars.next() {
            match c {
                '.' => flush(&mut name, &mut keys),
                '[' => {
                    flush(&mut name, &mut keys);
                    let segment: String = chars.by_ref().take_while(|c| *c != ']').collect();
                    let segment = segment.trim();
                    if segment.is_empty() {
                        continue;
                    }
                    match segment.parse::<usize>() {
                        Ok(index) => keys.push(Key::Index(index)),
                        Err(_) => keys.push(Key::Name(segment.to_string())),
                    }
                }
                _ => name.push(c),
            }
        }
        flush(&mut name, &mut keys);

        Self { keys }
    }

    /// Appends anything convertible to a path, flattening it into this one.
    pub fn join(mut self, other: impl Into<Path>) -> Self {
        self.keys.extend(other.into().keys);
        self
    }

    /// Appends a single key.
    pub fn push(mut self, key: impl Into<Key>) -> Self {
        self.keys.push(key.into());
        self
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn into_keys(self) -> Vec<Key> {
        self.keys
    }

    /// Returns the sub-path covering `range`, clamped to this path's length.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Path {
        let len = self.keys.len();
        let start = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(len);
        let end = match range.end_bound() {
            Bound::Included(&n) => n.saturating_add(1),
            Bound::Excluded(&n) => n,
            Bound::Unbounded => len,
        }
        .clamp(start, len);

        Path {
            keys: self.keys[start..end].to_vec(),
        }
    }

    /// Everything but the last key. The root's parent is the root.
    pub fn parent(&self) -> Path {
        self.slice(..self.keys.len().saturating_sub(1))
    }

    pub fn last(&self) -> Option<&Key> {
        self.keys.last()
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.keys.starts_with(&prefix.keys)
    }

    /// Returns the remainder after `prefix`, or `None` if `prefix` does not
    /// lead this path.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
        self.keys.strip_prefix(prefix.keys.as_slice()).map(|rest| Path {
            keys: rest.to_vec(),
        })
    }

    /// Walks `value` along this path.
    ///
    /// Name keys only descend into namespaces and index keys only into lists;
    /// containers are read through their own accessors. Any mismatch or missing
    /// entry yields [`Value::Nothing`].
    pub fn lookup(&self, value: &Value) -> Value {
        let mut current = value.clone();
        for key in &self.keys {
            current = current.child(key);
            if current.is_nothing() {
                break;
            }
        }
        current
    }
}

impl Deref for Path {
    type Target = [Key];

    fn deref(&self) -> &Self::Target {
        &self.keys
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.keys.iter().enumerate() {
            match key {
                Key::Index(index) => write!(f, "[{index}]")?,
                Key::Name(name) if i == 0 => write!(f, "{name}")?,
                Key::Name(name) => write!(f, ".{name}")?,
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Path {
    fn from(text: &str) -> Self {
        Path::parse(text)
    }
}

impl From<String> for Path {
    fn from(text: String) -> Self {
        Path::parse(&text)
    }
}

impl From<Key> for Path {
    fn from(key: Key) -> Self {
        Path { keys: vec![key] }
    }
}

impl From<&Key> for Path {
    fn from(key: &Key) -> Self {
        Path {
            keys: vec![key.clone()],
        }
    }
}

impl From<usize> for Path {
    fn from(index: usize) -> Self {
        Key::Index(index).into()
    }
}

impl From<i32> for Path {
    fn from(index: i32) -> Self {
        Key::from(index).into()
    }
}

impl From<Vec<Key>> for Path {
    fn from(keys: Vec<Key>) -> Self {
        Path { keys }
    }
}

impl From<&[Key]> for Path {
    fn from(keys: &[Key]) -> Self {
        Path {
            keys: keys.to_vec(),
        }
    }
}

impl From<&Path> for Path {
    fn from(path: &Path) -> Self {
        path.clone()
    }
}

impl FromIterator<Key> for Path {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Path {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Builds a [`Path`] from any mix of text, keys, indices and other paths.
///
/// ```rust
/// # use livestate::path;
/// let base = path!("users[3]");
/// let full = path!(base, "profile", 0usize);
/// assert_eq!(full.to_string(), "users[3].profile[0]");
/// assert!(path!().is_empty());
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::path::Path::new()
    };
    ($($segment:expr),+ $(,)?) => {{
        let path = $crate::path::Path::new();
        $(
            let path = path.join($segment);
        )+
        path
    }};
}
