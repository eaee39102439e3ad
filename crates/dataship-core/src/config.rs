//! Configuration module
//!
//! Process-wide defaults for talking to the upload service and the storage
//! layer. Values are read once from the environment and never mutated
//! afterwards; each upload copies what it needs into its own `UploadConfig`.

use std::env;
use std::time::Duration;

use crate::constants::{DEFAULT_PROGRESS_INTERVAL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SERVICE_URL};
use crate::storage_types::StorageStrategy;

/// Service configuration shared by every upload started from one process.
#[derive(Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    pub proxy_url: Option<String>,
    pub storage_strategy: StorageStrategy,
    // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub storage_endpoint: Option<String>,
    pub progress_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVICE_URL.to_string(),
            access_token: None,
            proxy_url: None,
            storage_strategy: StorageStrategy::Auto,
            storage_endpoint: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("proxy_url", &self.proxy_url)
            .field("storage_strategy", &self.storage_strategy)
            .field("storage_endpoint", &self.storage_endpoint)
            .field("progress_interval", &self.progress_interval)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ServiceConfig {
    /// Load configuration from the environment (and a `.env` file if present).
    ///
    /// - `DATASHIP_ACCESS_TOKEN`: token used for every service call
    /// - `DATASHIP_API_URL`: overrides the default service URL
    /// - `HTTP_PROXY` / `http_proxy`: proxy for service and storage traffic
    /// - `DATASHIP_STORAGE_STRATEGY`: `auto`, `multipart` or `form-post`
    /// - `DATASHIP_STORAGE_ENDPOINT`: S3-compatible endpoint override
    /// - `DATASHIP_PROGRESS_INTERVAL_MS`, `DATASHIP_REQUEST_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let storage_strategy = match env::var("DATASHIP_STORAGE_STRATEGY") {
            Ok(value) => value.parse()?,
            Err(_) => StorageStrategy::Auto,
        };

        let progress_interval = env::var("DATASHIP_PROGRESS_INTERVAL_MS")
            .ok()
            .map(|s| {
                s.parse::<u64>().map_err(|_| {
                    anyhow::anyhow!("DATASHIP_PROGRESS_INTERVAL_MS must be a valid number")
                })
            })
            .transpose()?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PROGRESS_INTERVAL);

        let request_timeout = env::var("DATASHIP_REQUEST_TIMEOUT_SECS")
            .ok()
            .map(|s| {
                s.parse::<u64>().map_err(|_| {
                    anyhow::anyhow!("DATASHIP_REQUEST_TIMEOUT_SECS must be a valid number")
                })
            })
            .transpose()?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let config = ServiceConfig {
            base_url: env::var("DATASHIP_API_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_SERVICE_URL.to_string()),
            access_token: env::var("DATASHIP_ACCESS_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
            proxy_url: env::var("HTTP_PROXY")
                .or_else(|_| env::var("http_proxy"))
                .ok()
                .filter(|s| !s.is_empty()),
            storage_strategy,
            storage_endpoint: env::var("DATASHIP_STORAGE_ENDPOINT")
                .ok()
                .filter(|s| !s.is_empty()),
            progress_interval,
            request_timeout,
        };

        config.validate()?;
        tracing::debug!(
            base_url = %config.base_url,
            storage_strategy = %config.storage_strategy,
            proxy = config.proxy_url.is_some(),
            "Loaded service configuration"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "DATASHIP_API_URL must start with http:// or https://"
            ));
        }

        if self.progress_interval.is_zero() {
            return Err(anyhow::anyhow!(
                "DATASHIP_PROGRESS_INTERVAL_MS must be greater than zero"
            ));
        }

        Ok(())
    }

    /// Returns the access token, failing with the variable name when unset.
    pub fn require_access_token(&self) -> Result<&str, anyhow::Error> {
        self.access_token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("missing DATASHIP_ACCESS_TOKEN in environment"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_well_known_service() {
        let config = ServiceConfig::default();
        assert_eq!(config.base_url, DEFAULT_SERVICE_URL);
        assert_eq!(config.progress_interval, Duration::from_millis(100));
        assert_eq!(config.storage_strategy, StorageStrategy::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_http_base_url() {
        let config = ServiceConfig {
            base_url: "ftp://example.com".to_string(),
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_progress_interval() {
        let config = ServiceConfig {
            progress_interval: Duration::ZERO,
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_env_validates_what_it_loads() {
        std::env::set_var("DATASHIP_API_URL", "ftp://example.com");
        let result = ServiceConfig::from_env();
        std::env::remove_var("DATASHIP_API_URL");

        let err = result.unwrap_err();
        assert!(err.to_string().contains("DATASHIP_API_URL"));
    }

    #[test]
    fn debug_output_redacts_token() {
        let config = ServiceConfig {
            access_token: Some("sk.secret".to_string()),
            ..ServiceConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk.secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn require_access_token_names_the_variable() {
        let err = ServiceConfig::default().require_access_token().unwrap_err();
        assert!(err.to_string().contains("DATASHIP_ACCESS_TOKEN"));
    }
}
