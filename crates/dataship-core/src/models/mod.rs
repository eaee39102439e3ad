//! Domain models shared by the upload pipeline.

pub mod credentials;
pub mod dataset;
pub mod progress;
pub mod upload;

pub use credentials::Credentials;
pub use dataset::{DatasetRecord, UploadStatus};
pub use progress::ProgressSnapshot;
pub use upload::{BoxedReader, ByteStream, LengthReporter, Payload, UploadConfig, ValidatedUpload};
