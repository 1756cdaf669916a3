//! Error types for session store operations.

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested attribute is absent from the session's bag,
    /// including after a refresh from the remote store.
    #[error("attribute not found: {key}")]
    AttributeNotFound { key: String },

    /// The session id is not registered with the manager.
    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    /// The attribute bag could not be serialized to the wire format.
    #[error("serialize session state: {0}")]
    Serialization(#[source] serde_json::Error),

    /// A remote payload could not be decoded into an attribute bag.
    #[error("deserialize session state: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Connection pool exhausted, or dialing the backend failed.
    #[error("backend connection: {0}")]
    BackendConnection(String),

    /// A remote read failed after a connection was established.
    #[error("backend read: {0}")]
    BackendRead(String),

    /// A remote write or delete failed after a connection was established.
    #[error("backend write: {0}")]
    BackendWrite(String),

    /// Invalid startup configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;
