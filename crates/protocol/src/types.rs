use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Header map as returned by the control plane.
pub type Headers = HashMap<String, String>;

/// Remote object a transfer session operates on.
///
/// Owned by the caller; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTarget {
    pub object_id: String,
    /// Known size in bytes, taken from a describe call.
    #[serde(default)]
    pub size: u64,
}

impl TransferTarget {
    pub fn new(object_id: impl Into<String>, size: u64) -> Self {
        Self {
            object_id: object_id.into(),
            size,
        }
    }
}

/// Pre-signed PUT target for exactly one upload part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSlot {
    pub url: String,
    #[serde(default)]
    pub headers: Headers,
    /// 1-based part index this slot was issued for.
    pub part_index: u32,
}

impl UploadSlot {
    /// Content length the control plane expects for this part, if it sent one.
    ///
    /// Returns `Some(Err(raw))` when the header is present but not a number.
    pub fn declared_content_length(&self) -> Option<Result<u64, String>> {
        header_value(&self.headers, "content-length")
            .map(|raw| raw.trim().parse::<u64>().map_err(|_| raw.to_string()))
    }

    /// Headers to send with the PUT.
    ///
    /// `content-length` is dropped; the HTTP transport derives it from the body.
    pub fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case("content-length"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.sort();
        headers
    }
}

/// Pre-authenticated GET target valid for a whole download session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadGrant {
    pub url: String,
    #[serde(default)]
    pub headers: Headers,
}

impl DownloadGrant {
    /// Grant headers plus the `Range` header for `[start, end]` (inclusive).
    pub fn range_headers(&self, start: u64, end: u64) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case("range"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.sort();
        headers.push(("Range".into(), format!("bytes={start}-{end}")));
        headers
    }
}

/// Case-insensitive header lookup.
pub fn header_value<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
