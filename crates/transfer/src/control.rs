use std::future::Future;
use std::sync::Arc;

use lading_protocol::{
    DescribeResponse, DownloadGrant, DownloadRequest, TransferTarget, UploadRequest, UploadSlot,
};

use crate::TransferError;

/// Control-plane calls the transfer engine depends on.
///
/// Implementations run their own exchanges under a retry policy; the engine
/// treats any error returned here as final for the current part or session.
pub trait ControlPlane: Send + Sync {
    /// Requests a pre-signed PUT slot for one part.
    fn upload_slot(
        &self,
        target: &TransferTarget,
        request: &UploadRequest,
    ) -> impl Future<Output = Result<UploadSlot, TransferError>> + Send;

    /// Requests a pre-authenticated GET grant for a whole download session.
    fn download_grant(
        &self,
        target: &TransferTarget,
        request: &DownloadRequest,
    ) -> impl Future<Output = Result<DownloadGrant, TransferError>> + Send;

    /// Fetches the object's metadata (its size in particular).
    fn describe(
        &self,
        object_id: &str,
    ) -> impl Future<Output = Result<DescribeResponse, TransferError>> + Send;
}

impl<C: ControlPlane> ControlPlane for Arc<C> {
    fn upload_slot(
        &self,
        target: &TransferTarget,
        request: &UploadRequest,
    ) -> impl Future<Output = Result<UploadSlot, TransferError>> + Send {
        (**self).upload_slot(target, request)
    }

    fn download_grant(
        &self,
        target: &TransferTarget,
        request: &DownloadRequest,
    ) -> impl Future<Output = Result<DownloadGrant, TransferError>> + Send {
        (**self).download_grant(target, request)
    }

    fn describe(
        &self,
        object_id: &str,
    ) -> impl Future<Output = Result<DescribeResponse, TransferError>> + Send {
        (**self).describe(object_id)
    }
}
