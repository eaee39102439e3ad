use std::sync::Arc;

use dataship_core::Credentials;
use dataship_storage::{StorageWriter, UploadReader, WrittenObject};
use tokio_util::sync::CancellationToken;

use crate::error::UploadError;
use crate::progress::ProgressMeter;
use crate::source::ResolvedSource;

/// Pipes a source through a [`ProgressMeter`] into a [`StorageWriter`].
pub struct StreamUploader {
    writer: Arc<dyn StorageWriter>,
}

impl StreamUploader {
    pub fn new(writer: Arc<dyn StorageWriter>) -> Self {
        Self { writer }
    }

    /// Write the source to the credentials' bucket and key.
    ///
    /// The meter learns the total before the first byte moves (or later, for
    /// a deferred length). Success means the storage layer acknowledged the
    /// object; the source is closed when this returns, whatever the outcome.
    pub async fn upload(
        &self,
        creds: &Credentials,
        source: ResolvedSource,
        meter: &ProgressMeter,
        cancel: &CancellationToken,
    ) -> Result<WrittenObject, UploadError> {
        let ResolvedSource {
            reader,
            known_length,
            deferred_length,
        } = source;

        if let Some(length) = known_length {
            meter.set_total(length);
        } else if let Some(rx) = deferred_length {
            meter.defer_total(rx);
        }

        let reader: UploadReader = Box::pin(meter.wrap(reader));

        tracing::info!(
            bucket = %creds.storage_bucket,
            key = %creds.storage_key,
            strategy = %self.writer.strategy(),
            bytes = ?known_length,
            "Starting transfer"
        );

        let mut written = self
            .writer
            .write(&creds.storage_key, reader, known_length, cancel)
            .await?;

        if let Some(url) = creds.url.as_ref().filter(|u| !u.is_empty()) {
            written.url = url.clone();
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataship_storage::ObjectStoreWriter;
    use object_store::memory::InMemory;
    use std::time::Duration;

    fn source(data: &[u8], known: bool) -> ResolvedSource {
        ResolvedSource {
            reader: Box::new(std::io::Cursor::new(data.to_vec())),
            known_length: known.then_some(data.len() as u64),
            deferred_length: None,
        }
    }

    fn uploader() -> StreamUploader {
        StreamUploader::new(Arc::new(ObjectStoreWriter::with_store(
            Arc::new(InMemory::new()),
            "tiles",
        )))
    }

    #[tokio::test]
    async fn every_written_byte_is_metered() {
        let meter = ProgressMeter::new(Duration::from_millis(100));
        let creds = Credentials::new("tiles", "uploads/abc");

        let written = uploader()
            .upload(&creds, source(&[9u8; 4096], true), &meter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(written.bytes, 4096);
        assert_eq!(meter.transferred(), 4096);
        assert_eq!(meter.total(), Some(4096));
        assert_eq!(written.url, "http://tiles.s3.amazonaws.com/uploads/abc");
    }

    #[tokio::test]
    async fn credential_url_overrides_object_url() {
        let meter = ProgressMeter::new(Duration::from_millis(100));
        let creds = Credentials {
            url: Some("https://cdn.example/abc".to_string()),
            ..Credentials::new("tiles", "uploads/abc")
        };

        let written = uploader()
            .upload(&creds, source(b"abc", false), &meter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(written.url, "https://cdn.example/abc");
        assert_eq!(meter.total(), None);
        assert_eq!(meter.transferred(), 3);
    }

    #[tokio::test]
    async fn cancellation_maps_to_canceled() {
        let meter = ProgressMeter::new(Duration::from_millis(100));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = uploader()
            .upload(&Credentials::new("tiles", "k"), source(b"abc", true), &meter, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Canceled));
    }
}
