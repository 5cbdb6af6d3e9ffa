//! Error types for the transfer engine.

use std::time::Duration;

/// Errors produced by uploads, downloads and the retry controller.
///
/// Every network-facing variant carries the operation it failed on
/// (`upload part 3`, `download range bytes=0-65535`, ...).
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Connection or I/O failure before an HTTP status was known.
    #[error("{operation}: transport error: {message}")]
    Transport { operation: String, message: String },

    /// HTTP 503.
    #[error("{operation}: service unavailable (HTTP 503)")]
    ServerBusy {
        operation: String,
        retry_after: Option<Duration>,
    },

    /// HTTP 500.
    #[error("{operation}: internal server error (HTTP 500)")]
    ServerInternal { operation: String },

    /// Any other non-2xx status. Never retried.
    #[error("{operation}: request rejected with HTTP {status}: {body}")]
    ClientRequest {
        operation: String,
        status: u16,
        body: String,
    },

    /// Length or checksum mismatch. Never retried.
    #[error("{operation}: integrity check failed: {detail}")]
    Integrity { operation: String, detail: String },

    #[error("{operation}: giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<TransferError>,
    },

    /// The download grant kept being rejected after refreshing it.
    #[error("{operation}: download grant rejected with HTTP {status} after {refreshes} refreshes")]
    SessionExpired {
        operation: String,
        status: u16,
        refreshes: u32,
    },

    /// The control plane answered, but not with something usable.
    #[error("{operation}: control plane error: {message}")]
    ControlPlane { operation: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl TransferError {
    /// Whether the retry controller may repeat the exchange that produced this.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransferError::Transport { .. }
                | TransferError::ServerBusy { .. }
                | TransferError::ServerInternal { .. }
        )
    }

    /// HTTP status behind this error, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransferError::ServerBusy { .. } => Some(503),
            TransferError::ServerInternal { .. } => Some(500),
            TransferError::ClientRequest { status, .. }
            | TransferError::SessionExpired { status, .. } => Some(*status),
            TransferError::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}
