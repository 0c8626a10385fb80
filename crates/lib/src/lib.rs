//!
//! livestate: reactive, diffable values with publish/subscribe mirroring.
//!
//! ## Core Concepts
//!
//! * **Values (`value::Value`)**: JSON-like data (scalars, lists, ordered namespaces) plus functions, extension kinds and live containers.
//! * **Paths (`path::Path`)**: Sequences of name/index keys addressing a location inside a value, written `a.b[2].c`.
//! * **Deep operations (`deep`)**: Structural equality, copying, diffing and in-place assignment, terminating on cyclic graphs.
//! * **Changes (`change::Change`)**: Serializable `{path, old, new}` records that only apply when the target still matches `old`.
//! * **Containers (`container::Container`)**: Shared, observable namespaces and lists. Changes propagate to subscribers and up through every parent.
//! * **Sync (`sync::SyncHub`)**: Publishes a container over a message broker and keeps remote mirrors converged with it.

pub mod change;
pub mod container;
pub mod deep;
pub mod path;
pub mod sync;
pub mod value;

pub use change::{Change, ChangeKind};
pub use container::{Container, ContainerId, ContainerKind, Subscription};
pub use path::{Key, Path};
pub use sync::SyncHub;
pub use value::{DeepValue, Function, Namespace, Value};

/// Result type used throughout the livestate library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the livestate library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured value errors from the value and container modules
    #[error(transparent)]
    Value(value::ValueError),

    /// Structured sync errors from the sync module
    #[error(transparent)]
    Sync(sync::SyncError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Serialize(_) => "serialize",
            Error::Value(_) => "value",
            Error::Sync(_) => "sync",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Sync(sync_err) => sync_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error indicates a conflict (already exists).
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Sync(sync_err) => sync_err.is_conflict(),
            _ => false,
        }
    }

    /// Check if this error rejects a value, key or index given by the caller.
    pub fn is_invalid_input(&self) -> bool {
        match self {
            Error::Value(value_err) => {
                value_err.is_invalid_value()
                    || value_err.is_key_error()
                    || value_err.is_type_error()
            }
            _ => false,
        }
    }

    /// Check if this error is an assignment between incompatible kinds.
    pub fn is_incompatible_assign(&self) -> bool {
        match self {
            Error::Value(value_err) => value_err.is_incompatible_assign(),
            _ => false,
        }
    }

    /// Check if this error is network/transport related.
    pub fn is_network_error(&self) -> bool {
        match self {
            Error::Sync(sync_err) => sync_err.is_network_error(),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Sync(sync_err) => sync_err.is_timeout(),
            _ => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Error::Sync(sync_err) => sync_err.is_closed(),
            _ => false,
        }
    }

    /// Check if this error is serialization-related.
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Error::Serialize(_))
    }
}
