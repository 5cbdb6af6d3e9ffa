//! Chunked object transfer over pre-signed URLs.
//!
//! Uploads split a byte stream into fixed-size, MD5-tagged parts that are
//! PUT strictly in order. Downloads fetch contiguous byte ranges whose size
//! ramps up geometrically, and hand the result to the consumer in buffers of
//! a fixed size. Both paths run every HTTP exchange through a
//! [`RetryController`] that absorbs 500/503 responses and transport failures
//! with jittered exponential backoff.

mod accumulator;
mod checksum;
mod config;
mod control;
mod download;
mod error;
mod facade;
mod http;
mod progress;
mod retry;
mod upload;

#[cfg(test)]
mod mock;

pub use accumulator::ChunkAccumulator;
pub use checksum::md5_hex;
pub use config::{
    DEFAULT_CONSUMER_BUFFER_SIZE, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_RAMP_FACTOR,
    DEFAULT_REQUESTS_BETWEEN_RAMP, DEFAULT_UPLOAD_CHUNK_SIZE, MAX_DOWNLOAD_CHUNK_SIZE,
    MIN_DOWNLOAD_CHUNK_SIZE, TransferConfig,
};
pub use control::ControlPlane;
pub use download::{ChunkSizeState, DownloadStream, RampingDownloader};
pub use error::TransferError;
pub use facade::TransferFacade;
pub use http::{
    HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, TransportError,
};
pub use progress::{Direction, TransferProgress};
pub use retry::{RetryController, RetryPolicy, RetrySafety, parse_retry_after};
pub use upload::{PartUploader, UploadSummary};

pub use lading_protocol as protocol;
