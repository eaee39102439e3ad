use crate::keys::{encode_key_for_url, validate_storage_key};
use crate::s3_error::{describe_failure, parse_s3_error, parse_status};
use crate::traits::{StorageError, StorageResult, StorageWriter, UploadReader, WrittenObject};
use async_trait::async_trait;
use dataship_core::constants::{DEFAULT_PART_SIZE, MAX_IN_FLIGHT_PARTS};
use dataship_core::{Credentials, StorageStrategy};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStore, ObjectStoreExt, PutPayload, WriteMultipart};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

const DEFAULT_REGION: &str = "us-east-1";
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Multipart writer backed by any `object_store` implementation.
///
/// Built from access-key credentials it talks to S3 (or an S3-compatible
/// endpoint); [`ObjectStoreWriter::with_store`] wraps an arbitrary store,
/// e.g. `InMemory` or `LocalFileSystem`.
#[derive(Clone)]
pub struct ObjectStoreWriter {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
    part_size: usize,
    max_in_flight: usize,
}

impl ObjectStoreWriter {
    /// Build an S3 writer from scoped credentials.
    ///
    /// # Arguments
    /// * `creds` - credentials carrying an access key id and secret, and
    ///   optionally a session token and region
    /// * `endpoint_url` - custom endpoint for S3-compatible providers
    ///   (e.g. "http://localhost:9000" for MinIO)
    /// * `proxy_url` - HTTP proxy for storage traffic
    pub fn from_credentials(
        creds: &Credentials,
        endpoint_url: Option<&str>,
        proxy_url: Option<&str>,
    ) -> StorageResult<Self> {
        let (access_key_id, secret_access_key) =
            match (&creds.access_key_id, &creds.secret_access_key) {
                (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => (id, secret),
                _ => {
                    return Err(StorageError::ConfigError(
                        "credentials carry no access key id and secret".to_string(),
                    ))
                }
            };

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(creds.storage_bucket.clone())
            .with_region(creds.region.as_deref().unwrap_or(DEFAULT_REGION))
            .with_access_key_id(access_key_id.clone())
            .with_secret_access_key(secret_access_key.clone());

        if let Some(token) = &creds.session_token {
            builder = builder.with_token(token.clone());
        }

        if let Some(endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.to_string())
                .with_allow_http(allow_http);
        }

        if let Some(proxy) = proxy_url {
            builder = builder.with_proxy_url(proxy.to_string());
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: creds.storage_bucket.clone(),
            endpoint_url: endpoint_url.map(|e| e.trim_end_matches('/').to_string()),
            part_size: DEFAULT_PART_SIZE,
            max_in_flight: MAX_IN_FLIGHT_PARTS,
        })
    }

    /// Wrap an existing store. `bucket` is only used for URLs and logging.
    pub fn with_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            endpoint_url: None,
            part_size: DEFAULT_PART_SIZE,
            max_in_flight: MAX_IN_FLIGHT_PARTS,
        }
    }

    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    /// Copy the reader into the multipart upload until EOF.
    async fn pump(
        reader: &mut UploadReader,
        multipart: &mut WriteMultipart,
        buf: &mut [u8],
        max_in_flight: usize,
    ) -> StorageResult<u64> {
        let mut total = 0u64;
        loop {
            multipart
                .wait_for_capacity(max_in_flight)
                .await
                .map_err(map_object_store_error)?;

            let n = reader.read(buf).await.map_err(StorageError::SourceRead)?;
            if n == 0 {
                return Ok(total);
            }
            multipart.write(&buf[..n]);
            total += n as u64;
        }
    }
}

#[async_trait]
impl StorageWriter for ObjectStoreWriter {
    async fn write(
        &self,
        key: &str,
        mut reader: UploadReader,
        content_length: Option<u64>,
        cancel: &CancellationToken,
    ) -> StorageResult<WrittenObject> {
        validate_storage_key(key)?;
        let start = std::time::Instant::now();
        let location = Path::from(key);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        // Peek the first chunk so an empty source becomes a plain put.
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StorageError::Canceled),
            read = reader.read(&mut buf) => read.map_err(StorageError::SourceRead)?,
        };

        if first == 0 {
            self.store
                .put(&location, PutPayload::default())
                .await
                .map_err(map_object_store_error)?;

            tracing::info!(
                bucket = %self.bucket,
                key = %key,
                bytes = 0u64,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Empty object written"
            );
            return Ok(WrittenObject {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                url: self.object_url(key),
                bytes: 0,
            });
        }

        let upload = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StorageError::Canceled),
            upload = self.store.put_multipart(&location) => upload.map_err(map_object_store_error)?,
        };

        let mut multipart = WriteMultipart::new_with_chunk_size(upload, self.part_size);
        multipart.write(&buf[..first]);

        let pumped = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StorageError::Canceled),
            result = Self::pump(&mut reader, &mut multipart, &mut buf, self.max_in_flight) => {
                result.map(|rest| rest + first as u64)
            }
        };
        drop(reader);

        let bytes = match pumped {
            Ok(bytes) => bytes,
            Err(err) => {
                if let Err(abort_err) = multipart.abort().await {
                    tracing::warn!(
                        error = %abort_err,
                        bucket = %self.bucket,
                        key = %key,
                        "Failed to abort multipart upload"
                    );
                }
                tracing::error!(
                    error = %err,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Multipart upload failed"
                );
                return Err(err);
            }
        };

        multipart.finish().await.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                bytes,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Multipart upload completion failed"
            );
            map_object_store_error(e)
        })?;

        if let Some(expected) = content_length {
            if expected != bytes {
                tracing::warn!(
                    key = %key,
                    expected,
                    bytes,
                    "Source length differs from the declared length"
                );
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Multipart upload successful"
        );

        Ok(WrittenObject {
            bucket: self.bucket.clone(),
            key: key.to_string(),
            url: self.object_url(key),
            bytes,
        })
    }

    /// For AWS S3: `http://{bucket}.s3.amazonaws.com/{key}`.
    /// For S3-compatible providers (path style): `{endpoint}/{bucket}/{key}`.
    fn object_url(&self, key: &str) -> String {
        let key = encode_key_for_url(key);
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}/{}", endpoint, self.bucket, key),
            None => format!("http://{}.s3.amazonaws.com/{}", self.bucket, key),
        }
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn strategy(&self) -> StorageStrategy {
        StorageStrategy::Multipart
    }
}

/// Translate an `object_store` error into a write failure.
///
/// Status, code and message come from the S3 response embedded in the
/// error chain; the variant only supplies a status when none was rendered.
pub(crate) fn map_object_store_error(err: ObjectStoreError) -> StorageError {
    let text = render_chain(&err);
    let status = parse_status(&text).or(match &err {
        ObjectStoreError::PermissionDenied { .. } => Some(403),
        ObjectStoreError::Unauthenticated { .. } => Some(401),
        ObjectStoreError::NotFound { .. } => Some(404),
        ObjectStoreError::Precondition { .. } => Some(412),
        _ => None,
    });
    let parsed = parse_s3_error(&text);

    let message = match status {
        Some(status) => describe_failure(status, parsed.as_ref()),
        None => format!("S3 upload failed: {err}"),
    };

    StorageError::WriteFailed {
        status,
        code: parsed.map(|(code, _)| code),
        message,
    }
}

fn render_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    fn reader(data: Vec<u8>) -> UploadReader {
        Box::pin(std::io::Cursor::new(data))
    }

    /// Yields `ok_bytes` bytes, then fails.
    struct FailingReader {
        ok_bytes: usize,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.ok_bytes == 0 {
                return Poll::Ready(Err(std::io::Error::other("disk on fire")));
            }
            let n = self.ok_bytes.min(buf.remaining());
            buf.put_slice(&vec![7u8; n]);
            self.ok_bytes -= n;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn writes_payload_across_parts() {
        let store = Arc::new(InMemory::new());
        let writer = ObjectStoreWriter::with_store(store.clone(), "tiles").with_part_size(1024);
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();

        let written = writer
            .write("uploads/abc", reader(data.clone()), Some(5000), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(written.bytes, 5000);
        assert_eq!(written.url, "http://tiles.s3.amazonaws.com/uploads/abc");

        let stored = store
            .get(&Path::from("uploads/abc"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(stored.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn empty_source_writes_empty_object() {
        let store = Arc::new(InMemory::new());
        let writer = ObjectStoreWriter::with_store(store.clone(), "tiles");

        let written = writer
            .write("empty", reader(Vec::new()), Some(0), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(written.bytes, 0);
        let meta = store.head(&Path::from("empty")).await.unwrap();
        assert_eq!(meta.size, 0);
    }

    #[tokio::test]
    async fn source_read_error_is_not_a_storage_failure() {
        let store = Arc::new(InMemory::new());
        let writer = ObjectStoreWriter::with_store(store.clone(), "tiles").with_part_size(16);

        let err = writer
            .write(
                "broken",
                Box::pin(FailingReader { ok_bytes: 100 }),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::SourceRead(_)));
        assert!(store.head(&Path::from("broken")).await.is_err());
    }

    #[tokio::test]
    async fn canceled_before_start() {
        let writer = ObjectStoreWriter::with_store(Arc::new(InMemory::new()), "tiles");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = writer
            .write("k", reader(vec![1, 2, 3]), Some(3), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Canceled));
    }

    #[tokio::test]
    async fn canceled_mid_transfer_aborts() {
        let store = Arc::new(InMemory::new());
        let writer = ObjectStoreWriter::with_store(store.clone(), "tiles");
        let cancel = CancellationToken::new();

        // first chunk arrives, then the source stalls forever
        let (mut tx, rx) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut tx, b"partial").await.unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = writer
            .write("stalled", Box::pin(rx), None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Canceled));
        assert!(store.head(&Path::from("stalled")).await.is_err());
        drop(tx);
    }

    #[tokio::test]
    async fn works_with_local_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let store = object_store::local::LocalFileSystem::new_with_prefix(dir.path()).unwrap();
        let writer = ObjectStoreWriter::with_store(Arc::new(store), "local");

        let written = writer
            .write("nested/file.csv", reader(b"a,b\n1,2\n".to_vec()), Some(8), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(written.bytes, 8);
        let on_disk = std::fs::read(dir.path().join("nested/file.csv")).unwrap();
        assert_eq!(on_disk, b"a,b\n1,2\n");
    }

    #[test]
    fn object_url_uses_custom_endpoint() {
        let writer = ObjectStoreWriter::with_store(Arc::new(InMemory::new()), "tiles")
            .with_endpoint("http://localhost:9000/");
        assert_eq!(writer.object_url("a b"), "http://localhost:9000/tiles/a%20b");
        assert_eq!(writer.strategy(), StorageStrategy::Multipart);
    }

    #[test]
    fn from_credentials_requires_access_keys() {
        let creds = Credentials::new("tiles", "k");
        assert!(matches!(
            ObjectStoreWriter::from_credentials(&creds, None, None),
            Err(StorageError::ConfigError(_))
        ));

        let creds = Credentials {
            access_key_id: Some("AKIA".to_string()),
            secret_access_key: Some("secret".to_string()),
            session_token: Some("token".to_string()),
            ..Credentials::new("tiles", "k")
        };
        let writer =
            ObjectStoreWriter::from_credentials(&creds, Some("http://localhost:9000"), None).unwrap();
        assert_eq!(writer.bucket(), "tiles");
        assert_eq!(writer.object_url("k"), "http://localhost:9000/tiles/k");
    }

    #[test]
    fn permission_denied_without_response_keeps_variant_status() {
        let err = map_object_store_error(ObjectStoreError::PermissionDenied {
            path: "k".to_string(),
            source: Box::new(std::io::Error::other("denied")),
        });
        match err {
            StorageError::WriteFailed { status, code, message } => {
                assert_eq!(status, Some(403));
                assert_eq!(code, None);
                assert_eq!(message, "S3 upload failed. Status: 403");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    fn s3_creds() -> Credentials {
        Credentials {
            access_key_id: Some("AKIA".to_string()),
            secret_access_key: Some("secret".to_string()),
            ..Credentials::new("tiles", "uploads/abc")
        }
    }

    async fn rejected_write(status: usize, body: &str) -> StorageError {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", mockito::Matcher::Regex(r"^/tiles/".to_string()))
            .match_query(mockito::Matcher::Any)
            .with_status(status)
            .with_header("content-type", "application/xml")
            .with_body(body)
            .create_async()
            .await;

        let writer =
            ObjectStoreWriter::from_credentials(&s3_creds(), Some(&server.url()), None).unwrap();
        writer
            .write("uploads/abc", reader(vec![1u8; 100]), Some(100), &CancellationToken::new())
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn s3_rejection_reports_response_code_and_status() {
        let err = rejected_write(
            403,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <Error><Code>SignatureDoesNotMatch</Code>\
             <Message>The request signature we calculated does not match</Message></Error>",
        )
        .await;

        match err {
            StorageError::WriteFailed { status, code, message } => {
                assert_eq!(status, Some(403));
                assert_eq!(code.as_deref(), Some("SignatureDoesNotMatch"));
                assert_eq!(
                    message,
                    "S3 upload failed. Status: 403 (SignatureDoesNotMatch - \
                     The request signature we calculated does not match)"
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn s3_client_errors_outside_known_variants_keep_status() {
        let err = rejected_write(
            400,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <Error><Code>EntityTooLarge</Code>\
             <Message>Your proposed upload exceeds the maximum allowed size</Message></Error>",
        )
        .await;

        assert_eq!(err.status(), Some(400));
        match err {
            StorageError::WriteFailed { code, message, .. } => {
                assert_eq!(code.as_deref(), Some("EntityTooLarge"));
                assert!(message.starts_with("S3 upload failed. Status: 400 (EntityTooLarge - "));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
