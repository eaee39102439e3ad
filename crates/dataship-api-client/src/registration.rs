//! Dataset registration and upload status.

use crate::{ApiClient, ApiError, ErrorBody};
use dataship_core::DatasetRecord;
use serde::Serialize;

/// Body of the create-upload call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateUploadRequest {
    /// URL of the written object
    pub url: String,
    /// Dataset id to create or patch
    pub tileset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub patch: bool,
}

impl ApiClient {
    /// Register an object as a dataset.
    ///
    /// `POST {base}/uploads/v1/{account}?access_token=..`. Only `201 Created`
    /// is success. A body that is not JSON, on success or failure, is an
    /// `InvalidJson` error. `409` (or a `422` saying the dataset exists) is
    /// reported as `AlreadyExists`.
    pub async fn create_upload(
        &self,
        account: &str,
        request: &CreateUploadRequest,
    ) -> Result<DatasetRecord, ApiError> {
        let url = self.build_url(&Self::uploads_path(account));
        let start = std::time::Instant::now();

        let response = self
            .authorized(self.client.post(&url))
            .json(request)
            .send()
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, dataset_id = %request.tileset, "Create upload request failed");
            })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        if status != 201 {
            let parsed: ErrorBody = serde_json::from_str(&body).map_err(|source| {
                ApiError::InvalidJson {
                    status: Some(status),
                    source,
                }
            })?;
            let message = parsed
                .message
                .unwrap_or_else(|| format!("Create upload failed. Status {status}"));

            tracing::error!(
                status,
                dataset_id = %request.tileset,
                message = %message,
                "Create upload rejected"
            );

            let exists = status == 409
                || (status == 422 && message.to_ascii_lowercase().contains("exist"));
            if exists {
                return Err(ApiError::AlreadyExists {
                    dataset_id: request.tileset.clone(),
                    status,
                    message,
                });
            }
            return Err(ApiError::Status { status, message });
        }

        let record: DatasetRecord =
            serde_json::from_str(&body).map_err(|source| ApiError::InvalidJson {
                status: Some(status),
                source,
            })?;

        tracing::info!(
            upload_id = %record.id,
            dataset_id = %request.tileset,
            patch = request.patch,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Dataset registered"
        );

        Ok(record)
    }

    /// Current state of an upload: `GET {base}/uploads/v1/{account}/{id}`.
    pub async fn upload_status(
        &self,
        account: &str,
        upload_id: &str,
    ) -> Result<DatasetRecord, ApiError> {
        let url = self.build_url(&format!(
            "{}/{}",
            Self::uploads_path(account),
            urlencoding::encode(upload_id)
        ));

        let response = self.authorized(self.client.get(&url)).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if !(200..300).contains(&status) {
            return Err(Self::status_error(status, &body, "Upload status lookup failed"));
        }

        serde_json::from_str(&body).map_err(|source| ApiError::InvalidJson {
            status: Some(status),
            source,
        })
    }

    /// Browser-facing URL of an upload's status resource (token not included).
    pub fn status_url(&self, account: &str, upload_id: &str) -> String {
        self.build_url(&format!(
            "{}/{}",
            Self::uploads_path(account),
            urlencoding::encode(upload_id)
        ))
    }
}
