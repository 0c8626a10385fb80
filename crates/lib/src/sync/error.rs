//! Error types for the synchronization module.

use thiserror::Error;

use super::broker::BrokerSubscriptionId;

/// Errors raised by brokers, publications and mirrors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// Transport failure reported by a broker implementation.
    #[error("Network error: {0}")]
    Network(String),

    /// A remote call did not complete within the configured timeout.
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u128 },

    /// No handler is registered under the given RPC name.
    #[error("No handler registered for '{0}'")]
    NotRegistered(String),

    /// A handler is already registered under the given RPC name.
    #[error("A handler is already registered for '{0}'")]
    AlreadyRegistered(String),

    /// Topic subscription does not exist (or was already removed).
    #[error("Unknown topic subscription: {0}")]
    UnknownSubscription(BrokerSubscriptionId),

    /// Unexpected response payload received from a remote handler.
    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: String,
    },

    /// The published value fetched for a topic cannot back a mirror.
    #[error("Topic '{topic}' holds a {kind}, expected a list or namespace")]
    InvalidSnapshot { topic: String, kind: &'static str },

    /// The publication or mirror has been closed.
    #[error("'{0}' is closed")]
    Closed(String),
}

impl SyncError {
    /// Check if this is a network/connection error.
    pub fn is_network_error(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Timeout { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SyncError::Timeout { .. })
    }

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SyncError::NotRegistered(_) | SyncError::UnknownSubscription(_)
        )
    }

    /// Check if this error indicates a conflict (already exists).
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::AlreadyRegistered(_))
    }

    /// Check if this is a protocol error (malformed remote data).
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SyncError::UnexpectedResponse { .. } | SyncError::InvalidSnapshot { .. }
        )
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SyncError::Closed(_))
    }
}

// Conversion from SyncError to the main Error type
impl From<SyncError> for crate::Error {
    fn from(err: SyncError) -> Self {
        crate::Error::Sync(err)
    }
}
