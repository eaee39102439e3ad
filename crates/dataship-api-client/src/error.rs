use thiserror::Error;

/// Errors returned by the upload service client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, TLS, timeout or proxy failure.
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success status; `message` is the server's own when it sent one.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Invalid JSON returned from upload service: {source}")]
    InvalidJson {
        status: Option<u16>,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid creds: {0}")]
    InvalidCredentials(String),

    #[error("Credentials were served from a shared cache and may already be used; retry the upload")]
    CachedCredentials,

    #[error("Dataset \"{dataset_id}\" already exists ({message}); rerun with --patch to replace it")]
    AlreadyExists {
        dataset_id: String,
        status: u16,
        message: String,
    },

    #[error("Client configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// HTTP status reported by the service, when there was one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            ApiError::Status { status, .. } | ApiError::AlreadyExists { status, .. } => {
                Some(*status)
            }
            ApiError::InvalidJson { status, .. } => *status,
            ApiError::InvalidCredentials(_) | ApiError::CachedCredentials | ApiError::Config(_) => {
                None
            }
        }
    }

    /// Whether re-running the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::CachedCredentials => true,
            ApiError::Transport(e) => e.is_timeout() || e.is_connect(),
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
