use thiserror::Error;

/// Errors returned by the key-value client and its transports.
#[derive(Error, Debug)]
pub enum KvError {
    /// The connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A request frame could not be written to the connection.
    ///
    /// Scoped to a single call; the session stays usable.
    #[error("send failed: {0}")]
    Send(String),

    /// The service answered this request with an error indicator.
    #[error("remote error: {0}")]
    Remote(String),

    /// No response arrived before the call's deadline.
    #[error("request timed out")]
    Timeout,

    /// The caller gave up on the request before it resolved.
    #[error("request cancelled")]
    Cancelled,

    /// The connection terminated; delivered to every in-flight call and to
    /// every call issued afterwards.
    #[error("connection closed")]
    ConnectionClosed,

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request was rejected before it reached the wire.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A required configuration value was not provided.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// The endpoint could not be turned into a WebSocket URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Transport misuse or failure not tied to a single call.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, KvError>;
