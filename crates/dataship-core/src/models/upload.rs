use std::fmt;
use std::path::{Path, PathBuf};

use tokio::io::AsyncRead;
use tokio::sync::oneshot;

use crate::config::ServiceConfig;
use crate::constants::DEFAULT_SERVICE_URL;
use crate::error::ValidationError;
use crate::validation::{
    derive_display_name, validate_dataset_id, validate_display_name, validate_required,
};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// A caller-supplied byte source with an optional length.
///
/// The length may be known up front, reported later through a
/// [`LengthReporter`], or never known at all.
pub struct ByteStream {
    reader: BoxedReader,
    known_length: Option<u64>,
    deferred_length: Option<oneshot::Receiver<u64>>,
}

impl ByteStream {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            known_length: None,
            deferred_length: None,
        }
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.known_length = Some(length);
        self
    }

    /// Create a stream whose length will be reported while it is being read.
    pub fn with_deferred_length<R>(reader: R) -> (Self, LengthReporter)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let stream = Self {
            reader: Box::new(reader),
            known_length: None,
            deferred_length: Some(rx),
        };
        (stream, LengthReporter(tx))
    }

    pub fn known_length(&self) -> Option<u64> {
        self.known_length
    }

    pub fn into_parts(self) -> (BoxedReader, Option<u64>, Option<oneshot::Receiver<u64>>) {
        (self.reader, self.known_length, self.deferred_length)
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("known_length", &self.known_length)
            .field("deferred_length", &self.deferred_length.is_some())
            .finish_non_exhaustive()
    }
}

/// Reports the total length of a [`ByteStream`] once the producer learns it.
#[derive(Debug)]
pub struct LengthReporter(oneshot::Sender<u64>);

impl LengthReporter {
    pub fn report(self, length: u64) {
        // the upload may already be over; nobody to tell
        let _ = self.0.send(length);
    }
}

/// The payload of one upload.
#[derive(Debug)]
pub enum Payload {
    File(PathBuf),
    Stream(ByteStream),
}

/// Per-call upload configuration.
///
/// Built with [`UploadConfig::builder`]. Nothing is checked until
/// [`UploadConfig::validate`], which consumes the config so a caller-supplied
/// stream is dropped (closed) when validation fails.
pub struct UploadConfig {
    pub source_account_id: String,
    pub dataset_id: String,
    pub access_token: String,
    pub display_name: Option<String>,
    pub patch_existing: bool,
    pub service_base_url: String,
    pub proxy_url: Option<String>,
    pub file_path: Option<PathBuf>,
    pub byte_stream: Option<ByteStream>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            source_account_id: String::new(),
            dataset_id: String::new(),
            access_token: String::new(),
            display_name: None,
            patch_existing: false,
            service_base_url: DEFAULT_SERVICE_URL.to_string(),
            proxy_url: None,
            file_path: None,
            byte_stream: None,
        }
    }
}

impl fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadConfig")
            .field("source_account_id", &self.source_account_id)
            .field("dataset_id", &self.dataset_id)
            .field("access_token", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("patch_existing", &self.patch_existing)
            .field("service_base_url", &self.service_base_url)
            .field("proxy_url", &self.proxy_url)
            .field("file_path", &self.file_path)
            .field("byte_stream", &self.byte_stream)
            .finish()
    }
}

impl UploadConfig {
    pub fn builder() -> UploadConfigBuilder {
        UploadConfigBuilder::default()
    }

    /// Check every field and split off the payload.
    pub fn validate(mut self) -> Result<(ValidatedUpload, Payload), ValidationError> {
        let payload = match (self.file_path.take(), self.byte_stream.take()) {
            (Some(path), None) => Payload::File(path),
            (None, Some(stream)) => Payload::Stream(stream),
            (None, None) => return Err(ValidationError::MissingField("file")),
            (Some(_), Some(_)) => {
                return Err(ValidationError::InvalidField {
                    field: "file",
                    reason: "a file path and a byte stream cannot both be set".to_string(),
                })
            }
        };

        let derived_name = match &payload {
            Payload::File(path) => derive_display_name(path),
            Payload::Stream(_) => None,
        };

        let mut validated = self.check_fields()?;
        if validated.display_name.is_none() {
            validated.display_name = derived_name;
        }

        Ok((validated, payload))
    }

    /// Check the fields needed to register an object that is already hosted.
    ///
    /// A payload, if any, is ignored.
    pub fn validate_registration(self) -> Result<ValidatedUpload, ValidationError> {
        self.check_fields()
    }

    fn check_fields(self) -> Result<ValidatedUpload, ValidationError> {
        validate_required(&self.source_account_id, "account")?;
        validate_required(&self.access_token, "access_token")?;
        validate_required(&self.dataset_id, "dataset_id")?;
        validate_dataset_id(&self.dataset_id, &self.source_account_id)?;

        if let Some(name) = &self.display_name {
            validate_display_name(name)?;
        }

        let base_url = self.service_base_url.trim_end_matches('/');
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ValidationError::InvalidField {
                field: "service_base_url",
                reason: format!("\"{}\" is not an http(s) URL", self.service_base_url),
            });
        }

        Ok(ValidatedUpload {
            account: self.source_account_id,
            dataset_id: self.dataset_id,
            access_token: self.access_token,
            display_name: self.display_name,
            patch_existing: self.patch_existing,
            service_base_url: base_url.to_string(),
            proxy_url: self.proxy_url,
        })
    }
}

/// Builder for [`UploadConfig`].
#[derive(Debug, Default)]
pub struct UploadConfigBuilder {
    config: UploadConfig,
}

impl UploadConfigBuilder {
    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.config.source_account_id = account.into();
        self
    }

    pub fn dataset_id(mut self, dataset_id: impl Into<String>) -> Self {
        self.config.dataset_id = dataset_id.into();
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = token.into();
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.config.display_name = Some(name.into());
        self
    }

    pub fn patch_existing(mut self, patch: bool) -> Self {
        self.config.patch_existing = patch;
        self
    }

    pub fn service_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.service_base_url = url.into();
        self
    }

    pub fn proxy_url(mut self, proxy: Option<String>) -> Self {
        self.config.proxy_url = proxy;
        self
    }

    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.config.file_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn stream(mut self, stream: ByteStream) -> Self {
        self.config.byte_stream = Some(stream);
        self
    }

    /// Apply process-wide defaults: base URL, proxy, and the token when
    /// none was set explicitly.
    pub fn service_defaults(mut self, service: &ServiceConfig) -> Self {
        self.config.service_base_url = service.base_url.clone();
        self.config.proxy_url = service.proxy_url.clone();
        if self.config.access_token.is_empty() {
            if let Some(token) = &service.access_token {
                self.config.access_token = token.clone();
            }
        }
        self
    }

    pub fn build(self) -> UploadConfig {
        self.config
    }
}

/// An upload configuration that passed validation.
#[derive(Clone)]
pub struct ValidatedUpload {
    pub account: String,
    pub dataset_id: String,
    pub access_token: String,
    pub display_name: Option<String>,
    pub patch_existing: bool,
    pub service_base_url: String,
    pub proxy_url: Option<String>,
}

impl fmt::Debug for ValidatedUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedUpload")
            .field("account", &self.account)
            .field("dataset_id", &self.dataset_id)
            .field("access_token", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("patch_existing", &self.patch_existing)
            .field("service_base_url", &self.service_base_url)
            .field("proxy_url", &self.proxy_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    fn base() -> UploadConfigBuilder {
        UploadConfig::builder()
            .account("test")
            .dataset_id("test.upload")
            .access_token("validtoken")
    }

    struct DropFlag {
        dropped: Arc<AtomicBool>,
    }

    impl AsyncRead for DropFlag {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn valid_file_config_derives_display_name() {
        let (validated, payload) = base().file("/tmp/roads.mbtiles").build().validate().unwrap();
        assert_eq!(validated.display_name.as_deref(), Some("roads"));
        assert_eq!(validated.service_base_url, DEFAULT_SERVICE_URL);
        assert!(matches!(payload, Payload::File(_)));
    }

    #[test]
    fn explicit_display_name_wins() {
        let (validated, _) = base()
            .file("/tmp/roads.mbtiles")
            .display_name("Main roads")
            .build()
            .validate()
            .unwrap();
        assert_eq!(validated.display_name.as_deref(), Some("Main roads"));
    }

    #[test]
    fn stream_payload_has_no_derived_name() {
        let stream = ByteStream::new(tokio::io::empty()).with_length(0);
        let (validated, payload) = base().stream(stream).build().validate().unwrap();
        assert_eq!(validated.display_name, None);
        match payload {
            Payload::Stream(s) => assert_eq!(s.known_length(), Some(0)),
            Payload::File(_) => panic!("expected stream payload"),
        }
    }

    #[test]
    fn missing_payload_is_rejected_first() {
        let err = UploadConfig::builder().build().validate().unwrap_err();
        assert_eq!(err, ValidationError::MissingField("file"));
    }

    #[test]
    fn both_payload_sources_are_rejected() {
        let err = base()
            .file("a.csv")
            .stream(ByteStream::new(tokio::io::empty()))
            .build()
            .validate()
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field: "file", .. }));
    }

    #[test]
    fn missing_required_fields() {
        let err = UploadConfig::builder()
            .dataset_id("test.upload")
            .access_token("t")
            .file("a.csv")
            .build()
            .validate()
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField("account"));

        let err = UploadConfig::builder()
            .account("test")
            .dataset_id("test.upload")
            .file("a.csv")
            .build()
            .validate()
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField("access_token"));

        let err = UploadConfig::builder()
            .account("test")
            .access_token("t")
            .file("a.csv")
            .build()
            .validate()
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField("dataset_id"));
    }

    #[test]
    fn dataset_prefix_mismatch_is_rejected() {
        let err = base()
            .dataset_id("wrong.account")
            .file("a.csv")
            .build()
            .validate()
            .unwrap_err();
        assert!(matches!(err, ValidationError::DatasetAccountMismatch { .. }));
    }

    #[test]
    fn invalid_display_name_is_rejected() {
        let err = base()
            .file("a.csv")
            .display_name("bad/name")
            .build()
            .validate()
            .unwrap_err();
        assert!(matches!(err, ValidationError::DisplayNameCharset(_)));
    }

    #[test]
    fn failed_validation_drops_the_stream() {
        let dropped = Arc::new(AtomicBool::new(false));
        let stream = ByteStream::new(DropFlag {
            dropped: dropped.clone(),
        });
        let result = UploadConfig::builder().stream(stream).build().validate();
        assert!(result.is_err());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn service_defaults_fill_base_url_and_token() {
        let service = ServiceConfig {
            base_url: "http://localhost:9000".to_string(),
            access_token: Some("from-env".to_string()),
            proxy_url: Some("http://proxy:3128".to_string()),
            ..ServiceConfig::default()
        };
        let config = UploadConfig::builder()
            .account("test")
            .dataset_id("test.upload")
            .service_defaults(&service)
            .build();
        assert_eq!(config.access_token, "from-env");
        assert_eq!(config.service_base_url, "http://localhost:9000");
        assert_eq!(config.proxy_url.as_deref(), Some("http://proxy:3128"));

        let config = UploadConfig::builder()
            .access_token("explicit")
            .service_defaults(&service)
            .build();
        assert_eq!(config.access_token, "explicit");
    }

    #[test]
    fn registration_validation_ignores_payload() {
        let validated = base().build().validate_registration().unwrap();
        assert_eq!(validated.dataset_id, "test.upload");
    }

    #[test]
    fn debug_output_redacts_token() {
        let config = base().file("a.csv").build();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("validtoken"));
    }

    #[tokio::test]
    async fn deferred_length_is_delivered() {
        let (stream, reporter) = ByteStream::with_deferred_length(tokio::io::empty());
        let (_reader, known, deferred) = stream.into_parts();
        assert_eq!(known, None);
        reporter.report(42);
        assert_eq!(deferred.unwrap().await.unwrap(), 42);
    }
}
