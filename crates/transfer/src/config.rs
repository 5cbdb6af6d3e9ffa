//! Transfer engine configuration.
//!
//! Configuration is immutable once handed to the engine. It can be built in
//! code or read from TOML, e.g.:
//!
//! ```toml
//! upload_chunk_size = 8388608
//! max_retry_attempts = 10
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::TransferError;
use crate::retry::RetryPolicy;

/// Upload part size: 16 MiB.
pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// First download range size: 64 KiB.
pub const MIN_DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Download range size cap: 16 MiB.
pub const MAX_DOWNLOAD_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Size of the buffers handed to download consumers: 5 MiB.
pub const DEFAULT_CONSUMER_BUFFER_SIZE: usize = 5 * 1024 * 1024;

pub const DEFAULT_RAMP_FACTOR: u32 = 2;
pub const DEFAULT_REQUESTS_BETWEEN_RAMP: u32 = 4;
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 8;

const DEFAULT_INITIAL_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_MAX_GRANT_REFRESHES: u32 = 3;

/// Chunking, ramp and retry parameters for one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Size of every upload part except the last.
    pub upload_chunk_size: usize,
    /// Range size of the first download requests.
    pub min_download_chunk_size: usize,
    /// Range size the ramp never exceeds.
    pub max_download_chunk_size: usize,
    /// Size of the buffers a download stream yields (the last one may be shorter).
    pub consumer_buffer_size: usize,
    /// Multiplier applied to the range size at each ramp step.
    pub ramp_factor: u32,
    /// Successful range requests between ramp steps.
    pub requests_between_ramp: u32,
    /// Total attempts (first try included) for one exchange.
    pub max_retry_attempts: u32,
    /// Base of the exponential backoff, in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Grant refreshes allowed for one range before the session is declared expired.
    pub max_grant_refreshes: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            min_download_chunk_size: MIN_DOWNLOAD_CHUNK_SIZE,
            max_download_chunk_size: MAX_DOWNLOAD_CHUNK_SIZE,
            consumer_buffer_size: DEFAULT_CONSUMER_BUFFER_SIZE,
            ramp_factor: DEFAULT_RAMP_FACTOR,
            requests_between_ramp: DEFAULT_REQUESTS_BETWEEN_RAMP,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            initial_retry_delay_ms: DEFAULT_INITIAL_RETRY_DELAY_MS,
            max_grant_refreshes: DEFAULT_MAX_GRANT_REFRESHES,
        }
    }
}

impl TransferConfig {
    /// Parses a TOML document; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, TransferError> {
        let config: TransferConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, TransferError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "transfer configuration loaded");
        Ok(config)
    }

    /// Rejects configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), TransferError> {
        let invalid = |msg: &str| Err(TransferError::InvalidConfig(msg.to_string()));

        if self.upload_chunk_size == 0 {
            return invalid("upload_chunk_size must be greater than 0");
        }
        if self.min_download_chunk_size == 0 {
            return invalid("min_download_chunk_size must be greater than 0");
        }
        if self.min_download_chunk_size > self.max_download_chunk_size {
            return invalid("min_download_chunk_size exceeds max_download_chunk_size");
        }
        if self.consumer_buffer_size == 0 {
            return invalid("consumer_buffer_size must be greater than 0");
        }
        if self.ramp_factor == 0 {
            return invalid("ramp_factor must be at least 1");
        }
        if self.requests_between_ramp == 0 {
            return invalid("requests_between_ramp must be greater than 0");
        }
        if self.max_retry_attempts == 0 {
            return invalid("max_retry_attempts must be greater than 0");
        }
        Ok(())
    }

    /// Backoff policy for every exchange run under this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            initial_delay: Duration::from_millis(self.initial_retry_delay_ms),
            backoff_factor: 2.0,
        }
    }
}
