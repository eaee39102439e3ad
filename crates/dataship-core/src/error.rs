//! Error types module
//!
//! Validation errors raised before any network activity, and the
//! `ErrorMetadata` trait every terminal error type implements so callers can
//! report failures uniformly (machine code, HTTP status, retryability, log
//! level) regardless of which upload phase produced them.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like stale credentials
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be presented and handled.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "CREDENTIAL_FETCH_ERROR")
    fn error_code(&self) -> &'static str;

    /// Numeric HTTP status reported by the remote side, when there was one
    fn status_code(&self) -> Option<u16>;

    /// Whether re-running the whole upload may succeed
    fn is_recoverable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Configuration problems detected before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("\"{0}\" option required")]
    MissingField(&'static str),

    #[error("Invalid dataset id \"{dataset_id}\" for account \"{account}\"")]
    DatasetAccountMismatch { dataset_id: String, account: String },

    #[error("Invalid dataset id \"{0}\": expected \"<account>.<name>\"")]
    MalformedDatasetId(String),

    #[error("Invalid name \"{0}\": only letters, digits, spaces, '_', '.' and '-' are allowed")]
    DisplayNameCharset(String),

    #[error("Invalid name: {length} characters exceeds the limit of {max}")]
    DisplayNameTooLong { length: usize, max: usize },

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ErrorMetadata for ValidationError {
    fn error_code(&self) -> &'static str {
        match self {
            ValidationError::MissingField(_) => "MISSING_FIELD",
            ValidationError::DatasetAccountMismatch { .. } => "DATASET_ACCOUNT_MISMATCH",
            ValidationError::MalformedDatasetId(_) => "MALFORMED_DATASET_ID",
            ValidationError::DisplayNameCharset(_) | ValidationError::DisplayNameTooLong { .. } => {
                "INVALID_DISPLAY_NAME"
            }
            ValidationError::InvalidField { .. } => "INVALID_FIELD",
        }
    }

    fn status_code(&self) -> Option<u16> {
        None
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn log_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}
