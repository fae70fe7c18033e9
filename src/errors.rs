use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Every way an upload can fail. Each variant maps to its own exit status.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid file {}: {reason}", .path.display())]
    InvalidFile { path: PathBuf, reason: String },

    #[error("rate limited by server, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("rejected by server: {0}")]
    RemoteRejected(String),

    #[error("transfer failed after {bytes_sent} bytes: {reason}")]
    Transfer { reason: String, bytes_sent: u64 },

    #[error("upload cancelled after {bytes_sent} bytes")]
    Cancelled { bytes_sent: u64 },

    #[error("session is not open")]
    SessionNotOpen,

    #[error("session was already opened once; start a new session")]
    SessionReopened,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl UploadError {
    /// Whether a fresh attempt could succeed without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Network(_) | Self::Transfer { .. }
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidCredentials(_) | Self::InvalidFile { .. } | Self::InvalidConfig(_) => 2,
            Self::FileNotFound(_) => 3,
            Self::Authentication(_) => 4,
            Self::Network(_) => 5,
            Self::RateLimited { .. } => 6,
            Self::RemoteRejected(_) => 7,
            Self::Transfer { .. } => 8,
            Self::SessionNotOpen => 9,
            Self::SessionReopened => 10,
            // 128 + SIGINT
            Self::Cancelled { .. } => 130,
        }
    }
}
