use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

/// Emitted after every completed part or range.
///
/// Progress is best-effort: events are dropped when the receiver lags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub direction: Direction,
    pub object_id: String,
    /// Bytes confirmed by the storage service so far.
    pub bytes_done: u64,
    /// Total size, when known up front (downloads only).
    pub total: Option<u64>,
}

impl TransferProgress {
    /// Completion percentage, when the total is known.
    pub fn percentage(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(100.0),
            Some(total) => Some(self.bytes_done as f64 / total as f64 * 100.0),
            None => None,
        }
    }
}
