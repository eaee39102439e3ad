//! Dataship Core Library
//!
//! This crate provides the domain models, error metadata, configuration and
//! validation shared by every dataship component: the storage writers, the
//! upload service client, the upload orchestrator and the CLI.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::ServiceConfig;
pub use error::{ErrorMetadata, LogLevel, ValidationError};
pub use models::{
    BoxedReader, ByteStream, Credentials, DatasetRecord, LengthReporter, Payload,
    ProgressSnapshot, UploadConfig, UploadStatus, ValidatedUpload,
};
pub use models::upload::UploadConfigBuilder;
pub use storage_types::StorageStrategy;
