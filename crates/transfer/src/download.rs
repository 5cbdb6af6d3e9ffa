//! Ramping ranged download.
//!
//! A download session acquires one grant, then fetches contiguous byte
//! ranges starting at offset 0. The first ranges are `min_download_chunk_size`
//! bytes long; every `requests_between_ramp` successful requests the range
//! size is multiplied by `ramp_factor`, up to `max_download_chunk_size`.
//! Received bytes are regrouped into buffers of `consumer_buffer_size`.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use lading_protocol::{DownloadGrant, DownloadRequest, TransferTarget};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::accumulator::ChunkAccumulator;
use crate::control::ControlPlane;
use crate::http::{HttpRequest, HttpTransport};
use crate::progress::{Direction, TransferProgress};
use crate::retry::{RetryController, RetrySafety};
use crate::{TransferConfig, TransferError};

// ---------------------------------------------------------------------------
// Range size ramp
// ---------------------------------------------------------------------------

/// Current range size and the count toward the next ramp step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSizeState {
    current: usize,
    max: usize,
    factor: usize,
    requests_between_ramp: u32,
    since_ramp: u32,
}

impl ChunkSizeState {
    pub fn new(config: &TransferConfig) -> Self {
        Self {
            current: config.min_download_chunk_size,
            max: config.max_download_chunk_size,
            factor: config.ramp_factor as usize,
            requests_between_ramp: config.requests_between_ramp,
            since_ramp: 0,
        }
    }

    /// Range size for the next request.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Records one successful range request.
    pub fn advance(&mut self) {
        self.since_ramp += 1;
        if self.since_ramp >= self.requests_between_ramp {
            self.since_ramp = 0;
            self.current = self.current.saturating_mul(self.factor).min(self.max);
        }
    }
}

// ---------------------------------------------------------------------------
// Downloader
// ---------------------------------------------------------------------------

/// Opens download sessions against a transport and a control plane.
pub struct RampingDownloader<'a, T, C> {
    transport: &'a T,
    control: &'a C,
    config: TransferConfig,
    cancel: CancellationToken,
    progress: Option<mpsc::Sender<TransferProgress>>,
}

impl<'a, T: HttpTransport, C: ControlPlane> RampingDownloader<'a, T, C> {
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
            config: config.clone(),
            cancel,
            progress: None,
        })
    }

    /// Reports progress after every completed range.
    pub fn with_progress(mut self, tx: mpsc::Sender<TransferProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Acquires a download grant and returns a stream over the object's bytes.
    ///
    /// Grant failures surface here; range failures surface as stream items.
    /// No range is requested until the stream is polled. Dropping the stream
    /// cancels the session.
    pub async fn open(&self, target: &TransferTarget) -> Result<DownloadStream<'a>, TransferError> {
        let session_cancel = self.cancel.child_token();
        let grant_request = DownloadRequest::default();

        let grant = tokio::select! {
            biased;
            _ = session_cancel.cancelled() => return Err(TransferError::Cancelled),
            g = self.control.download_grant(target, &grant_request) => g?,
        };
        info!(object = %target.object_id, size = target.size, "download session opened");

        let session = Session {
            transport: self.transport,
            control: self.control,
            target: target.clone(),
            grant,
            retry: RetryController::new(self.config.retry_policy(), session_cancel.clone()),
            chunk: ChunkSizeState::new(&self.config),
            offset: 0,
            pending: ChunkAccumulator::new(),
            buffer_size: self.config.consumer_buffer_size,
            max_grant_refreshes: self.config.max_grant_refreshes,
            progress: self.progress.clone(),
        };

        let stream = futures_util::stream::try_unfold(session, |mut session| async move {
            let next = session.next_buffer().await?;
            Ok::<_, TransferError>(next.map(|buf| (buf, session)))
        });

        Ok(DownloadStream {
            inner: Box::pin(stream),
            size: target.size,
            _guard: session_cancel.drop_guard(),
        })
    }
}

/// State of one download session, owned by its stream.
struct Session<'a, T, C> {
    transport: &'a T,
    control: &'a C,
    target: TransferTarget,
    grant: DownloadGrant,
    retry: RetryController,
    chunk: ChunkSizeState,
    offset: u64,
    pending: ChunkAccumulator,
    buffer_size: usize,
    max_grant_refreshes: u32,
    progress: Option<mpsc::Sender<TransferProgress>>,
}

impl<T: HttpTransport, C: ControlPlane> Session<'_, T, C> {
    /// Next consumer buffer: exactly `buffer_size` bytes, except the last.
    async fn next_buffer(&mut self) -> Result<Option<Bytes>, TransferError> {
        if self.retry.cancel_token().is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        while self.pending.len() < self.buffer_size && self.offset < self.target.size {
            let data = self.fetch_range().await?;
            self.pending.append(&data);
        }

        if let Some(buf) = self.pending.next_chunk(self.buffer_size) {
            return Ok(Some(buf));
        }
        let rest = self.pending.drain_remainder();
        if rest.is_empty() {
            debug!(object = %self.target.object_id, "download complete");
            Ok(None)
        } else {
            Ok(Some(rest))
        }
    }

    /// Fetches the range starting at the current offset.
    ///
    /// A 401 or 403 means the grant expired: a fresh one is requested and the
    /// same range retried, at most `max_grant_refreshes` times.
    async fn fetch_range(&mut self) -> Result<Bytes, TransferError> {
        let start = self.offset;
        let len = (self.chunk.current() as u64).min(self.target.size - start);
        let end = start + len - 1;
        let operation = format!("download range bytes={start}-{end}");
        let transport = self.transport;
        let mut refreshes = 0;

        let resp = loop {
            let url = self.grant.url.clone();
            let headers = self.grant.range_headers(start, end);
            let result = self
                .retry
                .execute(&operation, RetrySafety::SafeToRetry, || {
                    transport.send(HttpRequest::get(url.clone(), headers.clone()))
                })
                .await;

            match result {
                Ok(resp) => break resp,
                Err(TransferError::ClientRequest {
                    status: status @ (401 | 403),
                    ..
                }) => {
                    if refreshes >= self.max_grant_refreshes {
                        return Err(TransferError::SessionExpired {
                            operation,
                            status,
                            refreshes,
                        });
                    }
                    refreshes += 1;
                    warn!(
                        object = %self.target.object_id,
                        status,
                        refreshes,
                        "download grant rejected, requesting a new one"
                    );
                    let cancel = self.retry.cancel_token().clone();
                    let grant_request = DownloadRequest::default();
                    let grant = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                        g = self.control.download_grant(&self.target, &grant_request) => g?,
                    };
                    self.grant = grant;
                }
                Err(e) => return Err(e),
            }
        };

        if resp.body.len() as u64 != len {
            return Err(TransferError::Integrity {
                operation,
                detail: format!("expected {len} bytes, received {}", resp.body.len()),
            });
        }

        self.offset += len;
        self.chunk.advance();
        debug!(
            object = %self.target.object_id,
            start,
            end,
            next_chunk = self.chunk.current(),
            "range received"
        );

        if let Some(tx) = &self.progress {
            let _ = tx.try_send(TransferProgress {
                direction: Direction::Download,
                object_id: self.target.object_id.clone(),
                bytes_done: self.offset,
                total: Some(self.target.size),
            });
        }
        Ok(resp.body)
    }
}

// ---------------------------------------------------------------------------
// DownloadStream
// ---------------------------------------------------------------------------

/// Ordered stream of an object's bytes in consumer-sized buffers.
///
/// Concatenating every item yields exactly the object's content. After an
/// error item the stream ends.
pub struct DownloadStream<'a> {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, TransferError>> + Send + 'a>>,
    size: u64,
    _guard: DropGuard,
}

impl<'a> DownloadStream<'a> {
    /// Total number of bytes the stream will yield.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Adapts the stream to [`AsyncRead`]; errors become `io::Error`s wrapping
    /// the [`TransferError`].
    pub fn into_async_read(self) -> impl AsyncRead + Unpin + Send + 'a {
        StreamReader::new(self.map_err(io::Error::other))
    }
}

impl Stream for DownloadStream<'_> {
    type Item = Result<Bytes, TransferError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for DownloadStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadStream")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
