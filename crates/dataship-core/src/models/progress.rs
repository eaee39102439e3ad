use serde::Serialize;

/// Point-in-time measurement of a transfer.
///
/// Fields that depend on the total length are `None` while it is unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub bytes_transferred: u64,
    pub total_bytes: Option<u64>,
    pub percentage: Option<f64>,
    /// Bytes transferred since the previous snapshot
    pub bytes_per_interval: u64,
    pub remaining_bytes: Option<u64>,
    pub eta_seconds: Option<f64>,
}

impl ProgressSnapshot {
    pub fn is_complete(&self) -> bool {
        matches!(self.total_bytes, Some(total) if total == self.bytes_transferred)
    }
}
