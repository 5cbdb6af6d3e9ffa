//! Control-plane API client.
//!
//! Async JSON client with Bearer token authentication. Every call goes
//! through a [`RetryController`] and is marked safe to retry: requesting a
//! slot or a grant twice only issues a second, equivalent URL.

use bytes::Bytes;
use lading_protocol::{
    DescribeResponse, DownloadGrant, DownloadRequest, DownloadResponse, TransferTarget,
    UploadRequest, UploadResponse, UploadSlot,
};
use lading_transfer::{
    ControlPlane, HttpRequest, HttpTransport, ReqwestTransport, RetryController, RetryPolicy,
    RetrySafety, TransferError, TransportError,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.lading.io/v1/objects";

/// Errors from the control-plane client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("HTTP client error: {0}")]
    Client(#[from] TransportError),

    #[error("{operation}: invalid JSON: {source}")]
    Json {
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid API token")]
    InvalidToken,
}

impl From<Error> for TransferError {
    fn from(e: Error) -> Self {
        match e {
            Error::Transfer(inner) => inner,
            Error::Json { operation, source } => TransferError::ControlPlane {
                operation,
                message: format!("invalid JSON: {source}"),
            },
            other => TransferError::ControlPlane {
                operation: "control plane".into(),
                message: other.to_string(),
            },
        }
    }
}

/// Control-plane API client.
pub struct ApiClient<T = ReqwestTransport> {
    transport: T,
    base_url: String,
    authorization: String,
    retry: RetryController,
}

impl ApiClient<ReqwestTransport> {
    /// Creates a client with its own connection pool.
    pub fn new(token: &str) -> Result<Self, Error> {
        Self::with_transport(ReqwestTransport::new()?, token)
    }
}

impl<T: HttpTransport> ApiClient<T> {
    /// Creates a client over an existing transport, e.g. one shared with the
    /// transfer engine.
    pub fn with_transport(transport: T, token: &str) -> Result<Self, Error> {
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(Error::InvalidToken);
        }
        Ok(Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            authorization: format!("Bearer {token}"),
            retry: RetryController::new(RetryPolicy::default(), CancellationToken::new()),
        })
    }

    /// Sets a custom base URL (staging deployments, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryController::new(policy, self.retry.cancel_token().clone());
        self
    }

    /// Cancelling this token aborts in-flight and future calls.
    pub fn cancel_token(&self) -> &CancellationToken {
        self.retry.cancel_token()
    }

    /// Performs an authenticated JSON POST on one of the object's routes.
    async fn post<B, R>(
        &self,
        operation: &str,
        object_id: &str,
        route: &str,
        body: &B,
    ) -> Result<R, Error>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let encoded = utf8_percent_encode(object_id, NON_ALPHANUMERIC);
        let url = format!("{}/{encoded}/{route}", self.base_url);
        let payload = serde_json::to_vec(body).map_err(|source| Error::Json {
            operation: operation.to_string(),
            source,
        })?;
        let payload = Bytes::from(payload);
        let headers = vec![
            ("Authorization".to_string(), self.authorization.clone()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];

        let resp = self
            .retry
            .execute(operation, RetrySafety::SafeToRetry, || {
                self.transport.send(HttpRequest::post(
                    url.clone(),
                    headers.clone(),
                    payload.clone(),
                ))
            })
            .await?;

        serde_json::from_slice(&resp.body).map_err(|source| Error::Json {
            operation: operation.to_string(),
            source,
        })
    }
}

impl<T: HttpTransport> ControlPlane for ApiClient<T> {
    async fn upload_slot(
        &self,
        target: &TransferTarget,
        request: &UploadRequest,
    ) -> Result<UploadSlot, TransferError> {
        let operation = format!("request upload slot for part {}", request.index);
        let resp: UploadResponse = self
            .post(&operation, &target.object_id, "upload", request)
            .await?;
        debug!(object = %target.object_id, part = request.index, "upload slot issued");
        Ok(resp.into_slot(request.index))
    }

    async fn download_grant(
        &self,
        target: &TransferTarget,
        request: &DownloadRequest,
    ) -> Result<DownloadGrant, TransferError> {
        let resp: DownloadResponse = self
            .post("request download grant", &target.object_id, "download", request)
            .await?;
        debug!(object = %target.object_id, "download grant issued");
        Ok(resp.into())
    }

    async fn describe(&self, object_id: &str) -> Result<DescribeResponse, TransferError> {
        let options = serde_json::Map::new();
        let resp = self
            .post("describe object", object_id, "describe", &options)
            .await?;
        Ok(resp)
    }
}
