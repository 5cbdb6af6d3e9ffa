//! Sequential multipart upload.
//!
//! The source is cut into parts of exactly `upload_chunk_size` bytes (the last
//! part may be shorter). For each part, in order, a slot is requested from the
//! control plane with the part's size, MD5 and 1-based index, and the part is
//! PUT to the slot URL. Part `n + 1` is never started before part `n` has been
//! acknowledged.

use std::io;

use bytes::Bytes;
use lading_protocol::{TransferTarget, UploadRequest, UploadSlot};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::accumulator::ChunkAccumulator;
use crate::checksum::md5_hex;
use crate::control::ControlPlane;
use crate::http::{HttpRequest, HttpTransport};
use crate::progress::{Direction, TransferProgress};
use crate::retry::{RetryController, RetrySafety};
use crate::{TransferConfig, TransferError};

/// Size of each read from the upload source.
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Outcome of a completed upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Number of parts uploaded; also the index of the last one.
    pub parts: u32,
    pub bytes: u64,
}

/// Uploads one byte source as an ordered sequence of parts.
pub struct PartUploader<'a, T, C> {
    transport: &'a T,
    control: &'a C,
    chunk_size: usize,
    retry: RetryController,
    progress: Option<mpsc::Sender<TransferProgress>>,
}

impl<'a, T: HttpTransport, C: ControlPlane> PartUploader<'a, T, C> {
    /// Fails with [`TransferError::InvalidConfig`] if `config` does not validate.
    pub fn new(
        transport: &'a T,
        control: &'a C,
        config: &TransferConfig,
        cancel: CancellationToken,
    ) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self {
            transport,
            control,
            chunk_size: config.upload_chunk_size,
            retry: RetryController::new(config.retry_policy(), cancel),
            progress: None,
        })
    }

    /// Reports progress after every acknowledged part.
    pub fn with_progress(mut self, tx: mpsc::Sender<TransferProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Reads `source` to the end and uploads it part by part.
    ///
    /// An empty source uploads no parts. The first part that fails stops the
    /// upload; parts already acknowledged stay on the server.
    pub async fn upload<R>(
        &self,
        target: &TransferTarget,
        mut source: R,
    ) -> Result<UploadSummary, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let cancel = self.retry.cancel_token().clone();
        let mut acc = ChunkAccumulator::with_capacity(self.chunk_size.min(4 * READ_BUFFER_SIZE));
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut summary = UploadSummary::default();

        loop {
            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                r = source.read(&mut buf) => r?,
            };
            if n == 0 {
                break;
            }
            acc.append(&buf[..n]);

            while let Some(part) = acc.next_chunk(self.chunk_size) {
                self.upload_part(target, &mut summary, part).await?;
            }
        }

        let last = acc.drain_remainder();
        if !last.is_empty() {
            self.upload_part(target, &mut summary, last).await?;
        }

        info!(
            object = %target.object_id,
            parts = summary.parts,
            bytes = summary.bytes,
            "upload complete"
        );
        Ok(summary)
    }

    async fn upload_part(
        &self,
        target: &TransferTarget,
        summary: &mut UploadSummary,
        part: Bytes,
    ) -> Result<(), TransferError> {
        let index = summary.parts + 1;
        let operation = format!("upload part {index}");
        // Parts can be many MiB; hash off the runtime threads.
        let hashed = part.clone();
        let md5 = tokio::task::spawn_blocking(move || md5_hex(&hashed))
            .await
            .map_err(io::Error::other)?;
        let request = UploadRequest {
            size: part.len() as u64,
            md5,
            index,
        };

        let cancel = self.retry.cancel_token();
        let slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            s = self.control.upload_slot(target, &request) => s?,
        };
        check_slot_length(&operation, &slot, request.size)?;

        let headers = slot.request_headers();
        self.retry
            .execute(&operation, RetrySafety::SafeToRetry, || {
                self.transport.send(HttpRequest::put(
                    slot.url.clone(),
                    headers.clone(),
                    part.clone(),
                ))
            })
            .await?;

        summary.parts = index;
        summary.bytes += request.size;
        debug!(
            object = %target.object_id,
            part = index,
            size = request.size,
            md5 = %request.md5,
            "part uploaded"
        );

        if let Some(tx) = &self.progress {
            let _ = tx.try_send(TransferProgress {
                direction: Direction::Upload,
                object_id: target.object_id.clone(),
                bytes_done: summary.bytes,
                total: None,
            });
        }
        Ok(())
    }
}

/// The slot's `content-length`, when present, must equal the part length.
fn check_slot_length(
    operation: &str,
    slot: &UploadSlot,
    part_len: u64,
) -> Result<(), TransferError> {
    let detail = match slot.declared_content_length() {
        None => return Ok(()),
        Some(Ok(declared)) if declared == part_len => return Ok(()),
        Some(Ok(declared)) => {
            format!("slot expects {declared} bytes but the part has {part_len}")
        }
        Some(Err(raw)) => format!("slot content-length {raw:?} is not a number"),
    };
    Err(TransferError::Integrity {
        operation: operation.to_string(),
        detail,
    })
}
