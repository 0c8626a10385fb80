//! Error types for value and container operations.
//!
//! Precondition mismatches while applying a [`Change`](crate::change::Change)
//! are not errors; they are reported as `None`. The variants here cover
//! programmer errors: storing a value a container cannot hold, addressing a
//! container with the wrong kind of key, or assigning between incompatible
//! root kinds.

use thiserror::Error;

/// Structured error types for value operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ValueError {
    /// The value kind cannot be stored in a container slot.
    #[error("Invalid value: {kind} cannot be stored in a container")]
    InvalidValue { kind: &'static str },

    /// A name key was used on a list or an index key on a namespace.
    #[error("Key kind mismatch: {container} container cannot be addressed by '{key}'")]
    KeyKind {
        container: &'static str,
        key: String,
    },

    /// A list index was beyond the end of the list.
    #[error("Index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A value that is neither a list nor a namespace was used where a
    /// container is required.
    #[error("Type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// `assign` reduced to a single whole-value replacement.
    #[error("Cannot assign {source_kind} onto {dest_kind} in place")]
    IncompatibleAssign {
        dest_kind: &'static str,
        source_kind: &'static str,
    },
}

impl ValueError {
    /// Check if this error is about a value that cannot be stored.
    pub fn is_invalid_value(&self) -> bool {
        matches!(self, ValueError::InvalidValue { .. })
    }

    /// Check if this error is about addressing a slot.
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            ValueError::KeyKind { .. } | ValueError::IndexOutOfRange { .. }
        )
    }

    /// Check if this error is a type mismatch.
    pub fn is_type_error(&self) -> bool {
        matches!(self, ValueError::TypeMismatch { .. })
    }

    /// Check if this error came from an incompatible `assign`.
    pub fn is_incompatible_assign(&self) -> bool {
        matches!(self, ValueError::IncompatibleAssign { .. })
    }
}

impl From<ValueError> for crate::Error {
    fn from(err: ValueError) -> Self {
        crate::Error::Value(err)
    }
}
