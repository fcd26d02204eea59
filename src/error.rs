//! Error types for todo-sync.

use crate::todos::ids::RecordId;

/// Top-level error type for the sync layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Record {id} has not been confirmed by the server yet")]
    ProvisionalId { id: RecordId },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors returned by the remote todo/category backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: String, id: i64 },

    #[error("Request {operation} rejected: {reason}")]
    Rejected { operation: String, reason: String },

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Input validation errors, raised before any cache write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: String },

    #[error("{field} is too long: {length} > {max}")]
    TooLong {
        field: String,
        length: usize,
        max: usize,
    },

    #[error("{raw} is not a valid record id")]
    InvalidId { raw: i64 },
}

/// Desktop IPC bridge errors.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("IPC channel {channel} is not on the allow-list")]
    ChannelNotAllowed { channel: String },

    #[error("Invalid arguments for {channel}: {reason}")]
    InvalidArguments { channel: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the sync layer.
pub type Result<T> = std::result::Result<T, Error>;
