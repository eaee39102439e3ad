//! Storage abstraction trait
//!
//! This module defines the `StorageWriter` trait every write strategy
//! implements, and the errors a write can end with.

use async_trait::async_trait;
use dataship_core::StorageStrategy;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage layer answered with something other than success.
    #[error("{message}")]
    WriteFailed {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// Reading the local source failed; nothing is wrong with storage.
    #[error("Failed to read upload source: {0}")]
    SourceRead(#[source] std::io::Error),

    #[error("Upload Canceled")]
    Canceled,

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),
}

impl StorageError {
    pub fn status(&self) -> Option<u16> {
        match self {
            StorageError::WriteFailed { status, .. } => *status,
            _ => None,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Reader handed to a writer. Dropping it closes the source.
pub type UploadReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// An object the storage layer acknowledged as completely written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenObject {
    pub bucket: String,
    pub key: String,
    /// URL registered with the upload service
    pub url: String,
    pub bytes: u64,
}

/// Storage write capability
///
/// One implementation per write protocol. A writer is bound to the bucket
/// of the credentials it was built from and writes exactly one object per
/// call.
#[async_trait]
pub trait StorageWriter: Send + Sync {
    /// Write everything `reader` yields to `key`.
    ///
    /// Returns only after the storage layer acknowledged the complete object,
    /// not merely after the reader hit EOF. The reader is dropped before
    /// returning on every path. When `cancel` fires the write is abandoned
    /// (and any partial multipart upload aborted) and `StorageError::Canceled`
    /// is returned.
    async fn write(
        &self,
        key: &str,
        reader: UploadReader,
        content_length: Option<u64>,
        cancel: &CancellationToken,
    ) -> StorageResult<WrittenObject>;

    /// URL of the object stored under `key`
    fn object_url(&self, key: &str) -> String;

    fn bucket(&self) -> &str;

    fn strategy(&self) -> StorageStrategy;
}
