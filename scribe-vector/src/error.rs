//! Error types for the `scribe-vector` crate.

use thiserror::Error;

/// Errors that can occur in vector-layer operations.
#[derive(Debug, Error)]
pub enum VectorError {
    /// A configuration validation error. Fatal at startup; never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backend could not be reached (network failure, timeout).
    ///
    /// Retried with backoff by the connection manager; recoverable with the
    /// existing client handle once the backend is reachable again.
    #[error("Vector backend unreachable: {message}")]
    Connection {
        /// A description of the underlying failure.
        message: String,
    },

    /// A transport/security negotiation fault (TLS handshake, protocol
    /// version mismatch).
    ///
    /// Unlike [`VectorError::Connection`], this class does not recover by
    /// re-probing: the client handle must be discarded and rebuilt.
    #[error("Transport negotiation fault: {message}")]
    TransportFault {
        /// A description of the underlying failure.
        message: String,
    },

    /// The target collection does not exist on the backend.
    ///
    /// Aggregate reads treat this as an empty result; similarity search and
    /// writes treat it as a hard error.
    #[error("Collection '{collection}' does not exist")]
    CollectionNotFound {
        /// The missing collection.
        collection: String,
    },

    /// A resource (collection or payload index) already exists.
    ///
    /// Expected when concurrent processes provision the same deployment;
    /// swallowed only where the schema registry flags it as benign.
    #[error("{resource} already exists")]
    AlreadyExists {
        /// The conflicting resource, e.g. `collection 'documents'`.
        resource: String,
    },

    /// The backend rejected or failed an operation.
    #[error("Vector backend error during {operation}: {message}")]
    Backend {
        /// The operation that failed, with collection/filter context.
        operation: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector layer is not connected and cannot serve the request.
    ///
    /// Raised immediately, without any network call, once initialization has
    /// exhausted its retries. The rest of the application is expected to keep
    /// running with vector-dependent features disabled.
    #[error("Vector service unavailable: {0}")]
    Unavailable(String),
}

impl VectorError {
    /// Whether the connection manager may retry the failed operation with the
    /// same client handle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VectorError::Connection { .. })
    }
}

/// A convenience result type for vector-layer operations.
pub type Result<T> = std::result::Result<T, VectorError>;
