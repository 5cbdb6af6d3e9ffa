use futures_util::TryStreamExt;
use lading_protocol::TransferTarget;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::control::ControlPlane;
use crate::download::{DownloadStream, RampingDownloader};
use crate::http::HttpTransport;
use crate::progress::TransferProgress;
use crate::upload::{PartUploader, UploadSummary};
use crate::{TransferConfig, TransferError};

/// Entry point for moving object content in and out of the storage service.
///
/// Holds a transport (shareable across sessions) and a control plane. Each
/// call runs one independent session under the given cancellation token.
///
/// Uploads require the target object to be open and empty with no other
/// writer; concurrent writers make the server-side part order undefined.
pub struct TransferFacade<T, C> {
    transport: T,
    control: C,
    config: TransferConfig,
    progress: Option<mpsc::Sender<TransferProgress>>,
}

impl<T: HttpTransport, C: ControlPlane> TransferFacade<T, C> {
    /// Fails with [`TransferError::InvalidConfig`] if `config` does not validate.
    pub fn new(transport: T, control: C, config: TransferConfig) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self {
            transport,
            control,
            config,
            progress: None,
        })
    }

    /// Sends progress for every session started from this facade.
    pub fn with_progress(mut self, tx: mpsc::Sender<TransferProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Builds a target from the object's current metadata.
    pub async fn target_for(
        &self,
        object_id: &str,
        cancel: CancellationToken,
    ) -> Result<TransferTarget, TransferError> {
        let described = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            d = self.control.describe(object_id) => d?,
        };
        Ok(TransferTarget::new(object_id, described.size))
    }

    /// Uploads everything `source` yields as the object's content.
    pub async fn upload<R>(
        &self,
        target: &TransferTarget,
        source: R,
        cancel: CancellationToken,
    ) -> Result<UploadSummary, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let mut uploader =
            PartUploader::new(&self.transport, &self.control, &self.config, cancel)?;
        if let Some(tx) = &self.progress {
            uploader = uploader.with_progress(tx.clone());
        }
        uploader.upload(target, source).await
    }

    pub async fn upload_bytes(
        &self,
        target: &TransferTarget,
        data: &[u8],
        cancel: CancellationToken,
    ) -> Result<UploadSummary, TransferError> {
        self.upload(target, data, cancel).await
    }

    /// Opens a lazy stream over the object's content (`target.size` bytes).
    pub async fn download_stream(
        &self,
        target: &TransferTarget,
        cancel: CancellationToken,
    ) -> Result<DownloadStream<'_>, TransferError> {
        let mut downloader =
            RampingDownloader::new(&self.transport, &self.control, &self.config, cancel)?;
        if let Some(tx) = &self.progress {
            downloader = downloader.with_progress(tx.clone());
        }
        downloader.open(target).await
    }

    /// Downloads the whole object into memory.
    pub async fn download_bytes(
        &self,
        target: &TransferTarget,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, TransferError> {
        let mut stream = self.download_stream(target, cancel).await?;
        let mut out = Vec::with_capacity(usize::try_from(target.size).unwrap_or(0));
        while let Some(buf) = stream.try_next().await? {
            out.extend_from_slice(&buf);
        }
        Ok(out)
    }

    /// Writes the object's content to `writer`, returning the byte count.
    ///
    /// On error the writer holds a prefix of the content.
    pub async fn download_to_writer<W>(
        &self,
        target: &TransferTarget,
        writer: &mut W,
        cancel: CancellationToken,
    ) -> Result<u64, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = self.download_stream(target, cancel).await?;
        let mut written: u64 = 0;
        while let Some(buf) = stream.try_next().await? {
            writer.write_all(&buf).await?;
            written += buf.len() as u64;
        }
        writer.flush().await?;
        info!(object = %target.object_id, bytes = written, "download written");
        Ok(written)
    }
}
