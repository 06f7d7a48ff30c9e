//! Error taxonomy for a single usage fetch.

use serde::{Deserialize, Serialize};

/// Why a sync cycle did not produce a fresh snapshot.
///
/// Every variant is recovered inside the cycle; the chain keeps running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UsageError {
    /// Session key rejected (HTTP 401/403).
    #[error("unauthorized: session key was rejected")]
    Unauthorized,

    /// HTTP 429, or the local minimum-fetch-interval guard tripped.
    #[error("rate limited")]
    RateLimited,

    /// Transport failure or timeout.
    #[error("network error")]
    NetworkError,

    /// 5xx or any other non-success response.
    #[error("server error {code}: {}", message.as_deref().unwrap_or("no message"))]
    ServerError {
        /// HTTP status code.
        code: u16,
        /// Reason phrase or diagnostic message.
        message: Option<String>,
    },

    /// No session key or organization configured.
    #[error("no credentials configured")]
    NoCredentials,

    /// Anything else; kept for diagnostics only.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl UsageError {
    /// Map a non-success HTTP status to an error.
    #[must_use]
    pub fn from_status(code: u16, message: Option<String>) -> Self {
        match code {
            401 | 403 => Self::Unauthorized,
            429 => Self::RateLimited,
            _ => Self::ServerError { code, message },
        }
    }

    /// `true` for failures worth retrying soon without user action.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::NetworkError | Self::ServerError { .. }
        )
    }

    /// Short text suitable for a transient banner.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Invalid session key.",
            Self::RateLimited => "Rate limited. Try again later.",
            Self::NetworkError => "Network error. Check your connection.",
            Self::ServerError { .. } => "Server error. Try again later.",
            Self::NoCredentials => "No session key configured.",
            Self::Unknown(_) => "Sync failed.",
        }
    }
}
