//! Payload resolution: turn a [`Payload`] into a reader plus whatever is
//! known about its length.

use dataship_core::{BoxedReader, Payload};
use tokio::sync::oneshot;

use crate::error::UploadError;

/// An open byte source. Dropping it closes the underlying file or stream.
pub struct ResolvedSource {
    pub reader: BoxedReader,
    pub known_length: Option<u64>,
    pub deferred_length: Option<oneshot::Receiver<u64>>,
}

impl std::fmt::Debug for ResolvedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSource")
            .field("known_length", &self.known_length)
            .field("deferred_length", &self.deferred_length.is_some())
            .finish_non_exhaustive()
    }
}

/// Open a file payload (length from its metadata) or unpack a caller stream.
pub async fn open_payload(payload: Payload) -> Result<ResolvedSource, UploadError> {
    match payload {
        Payload::File(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| UploadError::source_read(format!("Failed to open {}", path.display()), e))?;
            let metadata = file
                .metadata()
                .await
                .map_err(|e| UploadError::source_read(format!("Failed to stat {}", path.display()), e))?;

            if !metadata.is_file() {
                return Err(UploadError::source_read(
                    format!("Failed to open {}", path.display()),
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
                ));
            }

            tracing::debug!(path = %path.display(), bytes = metadata.len(), "Opened upload source");

            Ok(ResolvedSource {
                reader: Box::new(file),
                known_length: Some(metadata.len()),
                deferred_length: None,
            })
        }
        Payload::Stream(stream) => {
            let (reader, known_length, deferred_length) = stream.into_parts();
            Ok(ResolvedSource {
                reader,
                known_length,
                deferred_length,
            })
        }
    }
}
