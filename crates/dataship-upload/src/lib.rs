//! Dataship Upload Library
//!
//! Drives one upload through its three phases, in order:
//!
//! 1. fetch single-use storage credentials from the upload service
//! 2. stream the payload into object storage through a [`ProgressMeter`]
//! 3. register the written object as a dataset
//!
//! [`UploadOrchestrator::start`] validates the configuration synchronously and
//! returns an [`UploadHandle`] carrying one event channel: zero or more
//! progress snapshots followed by exactly one terminal event.

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod progress;
pub mod source;
pub mod uploader;

// Re-export commonly used types
pub use error::UploadError;
pub use events::{UploadEvent, UploadState};
pub use orchestrator::{UploadHandle, UploadOrchestrator};
pub use progress::{MeterTicker, MeteredReader, ProgressMeter};
pub use source::{open_payload, ResolvedSource};
pub use uploader::StreamUploader;
