//! HTTP client for the dataship upload service.
//!
//! The service authenticates every call with an `access_token` query
//! parameter. [`ApiClient`] carries the token, base URL, proxy and timeout of
//! one upload; the [`CredentialFetcher`] and [`DatasetRegistrar`] traits are
//! the seams the orchestrator drives it through.

pub mod credentials;
pub mod error;
pub mod registration;

use async_trait::async_trait;
use dataship_core::{Credentials, DatasetRecord, ValidatedUpload};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub use error::ApiError;
pub use registration::CreateUploadRequest;

/// Exchanges an access token for single-use storage credentials.
#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    async fn fetch_credentials(&self, account: &str) -> Result<Credentials, ApiError>;
}

/// Creates (or patches) the dataset record for a written object.
#[async_trait]
pub trait DatasetRegistrar: Send + Sync {
    async fn register_dataset(
        &self,
        account: &str,
        request: &CreateUploadRequest,
    ) -> Result<DatasetRecord, ApiError>;
}

/// Error body shape used by the service: `{"message": "..."}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// HTTP client for the upload service.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    access_token: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        access_token: &str,
        proxy_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(proxy) = proxy_url {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ApiError::Config(format!("Invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }

    /// Client for the service, token and proxy of one validated upload.
    pub fn for_upload(upload: &ValidatedUpload, timeout: Duration) -> Result<Self, ApiError> {
        Self::new(
            &upload.service_base_url,
            &upload.access_token,
            upload.proxy_url.as_deref(),
            timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/uploads/v1/{account}` with the account percent-encoded.
    fn uploads_path(account: &str) -> String {
        format!("/uploads/v1/{}", urlencoding::encode(account))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.query(&[("access_token", self.access_token.as_str())])
    }

    /// Error for a non-success response: the server's `message` when the
    /// body carries one, otherwise `fallback` with the status appended.
    fn status_error(status: u16, body: &str, fallback: &str) -> ApiError {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| format!("{fallback}. Status {status}"));
        ApiError::Status { status, message }
    }
}

#[async_trait]
impl CredentialFetcher for ApiClient {
    async fn fetch_credentials(&self, account: &str) -> Result<Credentials, ApiError> {
        ApiClient::fetch_credentials(self, account).await
    }
}

#[async_trait]
impl DatasetRegistrar for ApiClient {
    async fn register_dataset(
        &self,
        account: &str,
        request: &CreateUploadRequest,
    ) -> Result<DatasetRecord, ApiError> {
        self.create_upload(account, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:3000/", "tok", None, Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(
            client.build_url(&ApiClient::uploads_path("test")),
            "http://localhost:3000/uploads/v1/test"
        );
    }

    #[test]
    fn account_is_percent_encoded() {
        assert_eq!(ApiClient::uploads_path("a b/c"), "/uploads/v1/a%20b%2Fc");
    }

    #[test]
    fn debug_output_redacts_token() {
        let client = ApiClient::new("http://localhost", "sk.secret", None, Duration::from_secs(5)).unwrap();
        assert!(!format!("{:?}", client).contains("sk.secret"));
    }

    #[test]
    fn status_error_prefers_server_message() {
        let err = ApiClient::status_error(401, r#"{"message":"Unauthorized"}"#, "unused");
        assert_eq!(err.to_string(), "Unauthorized");

        let err = ApiClient::status_error(502, "<html>bad gateway</html>", "Upload service is not available");
        assert_eq!(err.to_string(), "Upload service is not available. Status 502");
        assert_eq!(err.status_code(), Some(502));
    }
}
