//! Dataship Storage Library
//!
//! This crate provides the `StorageWriter` capability and its implementations.
//! A writer moves one payload into the object location named by a set of
//! scoped credentials and reports the URL the upload service should register.
//!
//! # Strategies
//!
//! - [`ObjectStoreWriter`]: multipart upload through `object_store`, used when
//!   the credentials carry access keys (S3), or around any in-process store.
//! - [`FormPostWriter`]: a single pre-signed `multipart/form-data` POST, used
//!   when the credentials carry a policy and signature.
//!
//! [`create_writer`] picks one from the credentials and the configured
//! [`StorageStrategy`].

pub mod factory;
pub mod form_post;
pub(crate) mod keys;
pub mod s3;
pub(crate) mod s3_error;
pub mod traits;

// Re-export commonly used types
pub use dataship_core::StorageStrategy;
pub use factory::{create_writer, CredentialStorageProvider, StorageProvider};
pub use form_post::FormPostWriter;
pub use s3::ObjectStoreWriter;
pub use traits::{StorageError, StorageResult, StorageWriter, UploadReader, WrittenObject};
