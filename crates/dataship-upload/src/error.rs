//! Terminal error taxonomy of one upload.

use dataship_api_client::ApiError;
use dataship_core::{ErrorMetadata, LogLevel, ValidationError};
use dataship_storage::StorageError;
use thiserror::Error;

/// Every upload ends with at most one of these.
///
/// Messages from the upload service and the storage layer are shown
/// verbatim; the original error stays reachable through `source()`.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    ConfigValidation(#[from] ValidationError),

    #[error("{0}")]
    CredentialFetch(#[source] ApiError),

    #[error("{message}")]
    SourceRead {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    StorageWrite {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    #[error("Upload Canceled")]
    Canceled,

    #[error("{0}")]
    Registration(#[source] ApiError),

    /// The upload task went away without reporting an outcome.
    #[error("Upload interrupted: {0}")]
    Interrupted(String),
}

impl UploadError {
    pub fn source_read(context: impl std::fmt::Display, source: std::io::Error) -> Self {
        UploadError::SourceRead {
            message: format!("{context}: {source}"),
            source,
        }
    }

    /// Machine code reported by the storage layer, e.g. `AccessDenied`.
    pub fn storage_code(&self) -> Option<&str> {
        match self {
            UploadError::StorageWrite { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::WriteFailed {
                status,
                code,
                message,
            } => UploadError::StorageWrite {
                status,
                code,
                message,
            },
            StorageError::SourceRead(source) => {
                UploadError::source_read("Failed to read upload source", source)
            }
            StorageError::Canceled => UploadError::Canceled,
            // The key and the writer configuration both come from the
            // credential bundle.
            StorageError::InvalidKey(message) | StorageError::ConfigError(message) => {
                UploadError::CredentialFetch(ApiError::InvalidCredentials(message))
            }
            StorageError::BackendError(message) => UploadError::StorageWrite {
                status: None,
                code: None,
                message,
            },
        }
    }
}

impl ErrorMetadata for UploadError {
    fn error_code(&self) -> &'static str {
        match self {
            UploadError::ConfigValidation(_) => "CONFIG_VALIDATION_ERROR",
            UploadError::CredentialFetch(_) => "CREDENTIAL_FETCH_ERROR",
            UploadError::SourceRead { .. } => "SOURCE_READ_ERROR",
            UploadError::StorageWrite { .. } => "STORAGE_WRITE_ERROR",
            UploadError::Canceled => "UPLOAD_CANCELED",
            UploadError::Registration(_) => "REGISTRATION_ERROR",
            UploadError::Interrupted(_) => "UPLOAD_INTERRUPTED",
        }
    }

    fn status_code(&self) -> Option<u16> {
        match self {
            UploadError::CredentialFetch(e) | UploadError::Registration(e) => e.status_code(),
            UploadError::StorageWrite { status, .. } => *status,
            _ => None,
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            UploadError::CredentialFetch(e) | UploadError::Registration(e) => e.is_retryable(),
            UploadError::StorageWrite { status, .. } => {
                matches!(status, Some(s) if *s == 429 || *s >= 500)
            }
            UploadError::Interrupted(_) => true,
            _ => false,
        }
    }

    fn log_level(&self) -> LogLevel {
        match self {
            UploadError::ConfigValidation(_) | UploadError::Canceled => LogLevel::Debug,
            UploadError::CredentialFetch(ApiError::CachedCredentials) => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}
