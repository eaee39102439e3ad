//! Scoped credential issuance.

use crate::{ApiClient, ApiError};
use dataship_core::Credentials;

/// Random value defeating any cache between us and the issuing service.
fn decache_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Whether a cache-indicator header says the response came from a shared
/// cache, e.g. `X-Cache: Hit from cloudfront`.
fn served_from_cache(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get("x-cache")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("hit"))
        .unwrap_or(false)
}

impl ApiClient {
    /// Fetch single-use storage credentials for `account`.
    ///
    /// `GET {base}/uploads/v1/{account}/credentials?access_token=..&decache=..`
    ///
    /// A cache-served response is rejected even when its body looks valid:
    /// the bundle may already have been consumed by another upload.
    pub async fn fetch_credentials(&self, account: &str) -> Result<Credentials, ApiError> {
        let url = self.build_url(&format!("{}/credentials", Self::uploads_path(account)));
        let start = std::time::Instant::now();

        let response = self
            .authorized(self.client.get(&url))
            .query(&[("decache", decache_token())])
            .send()
            .await
            .inspect_err(|e| {
                tracing::error!(error = %e, account = %account, "Credential request failed");
            })?;

        let status = response.status().as_u16();
        let cached = served_from_cache(response.headers());
        let body = response.text().await?;

        if !(200..300).contains(&status) {
            let err = Self::status_error(status, &body, "Upload service is not available");
            tracing::error!(status, error = %err, account = %account, "Credential request rejected");
            return Err(err);
        }

        if cached {
            tracing::warn!(account = %account, "Credentials served from a shared cache");
            return Err(ApiError::CachedCredentials);
        }

        let creds: Credentials = serde_json::from_str(&body).map_err(|source| {
            ApiError::InvalidJson {
                status: Some(status),
                source,
            }
        })?;

        if let Some(field) = creds.missing_field() {
            return Err(ApiError::InvalidCredentials(format!(
                "\"{field}\" missing or empty"
            )));
        }

        tracing::info!(
            account = %account,
            bucket = %creds.storage_bucket,
            key = %creds.storage_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Fetched upload credentials"
        );

        Ok(creds)
    }
}
