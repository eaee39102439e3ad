use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Processing status of a registered dataset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadStatus::Pending => write!(f, "pending"),
            UploadStatus::Processing => write!(f, "processing"),
            UploadStatus::Complete => write!(f, "complete"),
            UploadStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Dataset record returned by the upload service after registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetRecord {
    pub id: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    /// Dataset id the upload feeds
    #[serde(default, alias = "dataset")]
    pub tileset: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl DatasetRecord {
    pub fn status(&self) -> UploadStatus {
        if self.error.is_some() {
            UploadStatus::Failed
        } else if self.complete {
            UploadStatus::Complete
        } else if self.progress > 0.0 {
            UploadStatus::Processing
        } else {
            UploadStatus::Pending
        }
    }

    /// The dataset this record refers to, falling back to the upload id.
    pub fn dataset_ref(&self) -> &str {
        self.tileset.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_service_record() {
        let record: DatasetRecord = serde_json::from_value(json!({
            "id": "d51e4a022c4eda48ce6d1932fda36189",
            "progress": 0,
            "complete": false,
            "error": null,
            "created": "2014-11-27T18:47:30.065Z",
            "modified": "2014-11-27T18:47:30.065Z",
            "tileset": "test.upload",
            "owner": "test"
        }))
        .unwrap();

        assert_eq!(record.status(), UploadStatus::Pending);
        assert_eq!(record.dataset_ref(), "test.upload");
        assert_eq!(record.owner.as_deref(), Some("test"));
        assert!(record.created.is_some());
    }

    #[test]
    fn accepts_dataset_alias() {
        let record: DatasetRecord =
            serde_json::from_value(json!({ "id": "u1", "dataset": "test.roads" })).unwrap();
        assert_eq!(record.dataset_ref(), "test.roads");
    }

    #[test]
    fn status_follows_progress_flags() {
        let mut record: DatasetRecord = serde_json::from_value(json!({ "id": "u1" })).unwrap();
        assert_eq!(record.dataset_ref(), "u1");

        record.progress = 0.5;
        assert_eq!(record.status(), UploadStatus::Processing);

        record.complete = true;
        assert_eq!(record.status(), UploadStatus::Complete);

        record.error = Some("bad geometry".to_string());
        assert_eq!(record.status(), UploadStatus::Failed);
        assert_eq!(record.status().to_string(), "failed");
    }
}
