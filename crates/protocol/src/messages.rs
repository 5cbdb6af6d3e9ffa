use serde::{Deserialize, Serialize};

use crate::types::{DownloadGrant, Headers, UploadSlot};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Body of `POST /{object-id}/upload`: asks for a slot for one part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    /// Part length in bytes.
    pub size: u64,
    /// Lowercase hex MD5 of the part.
    pub md5: String,
    /// 1-based part index.
    pub index: u32,
}

/// Body of `POST /{object-id}/download`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub preauthenticated: bool,
}

impl Default for DownloadRequest {
    fn default() -> Self {
        Self {
            preauthenticated: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Response of the upload route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    #[serde(default)]
    pub headers: Headers,
}

impl UploadResponse {
    /// Binds the response to the part index it was requested for.
    pub fn into_slot(self, part_index: u32) -> UploadSlot {
        UploadSlot {
            url: self.url,
            headers: self.headers,
            part_index,
        }
    }
}

/// Response of the download route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub url: String,
    #[serde(default)]
    pub headers: Headers,
}

impl From<DownloadResponse> for DownloadGrant {
    fn from(r: DownloadResponse) -> Self {
        DownloadGrant {
            url: r.url,
            headers: r.headers,
        }
    }
}

/// The subset of describe output the transfer engine needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeResponse {
    pub id: String,
    #[serde(default)]
    pub size: u64,
}
