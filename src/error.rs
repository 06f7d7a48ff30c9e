//! Error types for the usage sync engine.

/// Top-level error type for configuration, persistence and scheduling.
///
/// Failures *inside* a sync cycle are classified as
/// [`UsageError`](crate::usage::UsageError) and never surface as this type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Configuration file could not be parsed or serialized.
    #[error("config error: {0}")]
    Config(String),

    /// Cached usage or preference state could not be read or written.
    #[error("store error: {0}")]
    Store(String),

    /// HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(String),

    /// Credential file error or rejected session key.
    #[error("credentials error: {0}")]
    Credentials(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SyncError>;
