//! Pre-signed form POST writer
//!
//! Sends the whole payload as one `multipart/form-data` request. Every policy
//! field from the credentials goes first and the `file` part last, as S3
//! requires. S3 rejects chunked POST bodies, so a source of unknown length is
//! buffered before sending.

use crate::keys::{encode_key_for_url, validate_storage_key};
use crate::s3_error::{describe_failure, parse_s3_error};
use crate::traits::{StorageError, StorageResult, StorageWriter, UploadReader, WrittenObject};
use async_trait::async_trait;
use dataship_core::{Credentials, StorageStrategy};
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

const ACCEPTED_STATUSES: &[u16] = &[200, 201, 204, 303];

pub struct FormPostWriter {
    client: reqwest::Client,
    creds: Credentials,
    endpoint_url: Option<String>,
}

impl FormPostWriter {
    pub fn new(creds: &Credentials, proxy_url: Option<&str>) -> StorageResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = proxy_url {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| StorageError::ConfigError(format!("Invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            creds: creds.clone(),
            endpoint_url: None,
        })
    }

    /// POST to `{endpoint}/{bucket}/` instead of the bucket's AWS host.
    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into().trim_end_matches('/').to_string());
        self
    }

    fn post_url(&self) -> String {
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}/", endpoint, self.creds.storage_bucket),
            None => format!("https://{}.s3.amazonaws.com/", self.creds.storage_bucket),
        }
    }

    fn policy_form(&self, key: &str) -> Form {
        self.creds
            .form_fields()
            .into_iter()
            .fold(Form::new(), |form, (name, value)| {
                if name == "key" {
                    form.text(name, key.to_string())
                } else {
                    form.text(name, value)
                }
            })
    }
}

#[async_trait]
impl StorageWriter for FormPostWriter {
    async fn write(
        &self,
        key: &str,
        mut reader: UploadReader,
        content_length: Option<u64>,
        cancel: &CancellationToken,
    ) -> StorageResult<WrittenObject> {
        validate_storage_key(key)?;
        let start = std::time::Instant::now();
        let file_name = key.rsplit('/').next().unwrap_or(key).to_string();

        // Read failures surface from reqwest as opaque body errors; keep the
        // original so it can be reported as a source error.
        let read_error: Arc<Mutex<Option<std::io::Error>>> = Arc::new(Mutex::new(None));

        let (part, bytes) = match content_length {
            Some(length) => {
                let slot = read_error.clone();
                let stream = ReaderStream::new(reader).map(move |chunk| {
                    chunk.map_err(|e| {
                        let message = e.to_string();
                        if let Ok(mut slot) = slot.lock() {
                            *slot = Some(e);
                        }
                        std::io::Error::other(message)
                    })
                });
                let body = reqwest::Body::wrap_stream(stream);
                (Part::stream_with_length(body, length), length)
            }
            None => {
                let mut buffer = Vec::new();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(StorageError::Canceled),
                    read = reader.read_to_end(&mut buffer) => {
                        read.map_err(StorageError::SourceRead)?;
                    }
                }
                drop(reader);
                let length = buffer.len() as u64;
                (Part::bytes(buffer), length)
            }
        };

        let form = self.policy_form(key).part("file", part.file_name(file_name));
        let request = self.client.post(self.post_url()).multipart(form).send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StorageError::Canceled),
            response = request => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                if let Some(source) = read_error.lock().ok().and_then(|mut slot| slot.take()) {
                    return Err(StorageError::SourceRead(source));
                }
                tracing::error!(
                    error = %e,
                    bucket = %self.creds.storage_bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Form POST request failed"
                );
                return Err(StorageError::WriteFailed {
                    status: e.status().map(|s| s.as_u16()),
                    code: None,
                    message: format!("S3 upload failed: {e}"),
                });
            }
        };

        let status = response.status().as_u16();
        if !ACCEPTED_STATUSES.contains(&status) {
            let body = response.text().await.unwrap_or_default();
            let parsed = parse_s3_error(&body);
            let message = describe_failure(status, parsed.as_ref());
            tracing::error!(
                status,
                bucket = %self.creds.storage_bucket,
                key = %key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "{}",
                message
            );
            return Err(StorageError::WriteFailed {
                status: Some(status),
                code: parsed.map(|(code, _)| code),
                message,
            });
        }

        tracing::info!(
            status,
            bucket = %self.creds.storage_bucket,
            key = %key,
            bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Form POST upload successful"
        );

        Ok(WrittenObject {
            bucket: self.creds.storage_bucket.clone(),
            key: key.to_string(),
            url: self.object_url(key),
            bytes,
        })
    }

    fn object_url(&self, key: &str) -> String {
        let key = encode_key_for_url(key);
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}/{}", endpoint, self.creds.storage_bucket, key),
            None => format!("http://{}.s3.amazonaws.com/{}", self.creds.storage_bucket, key),
        }
    }

    fn bucket(&self) -> &str {
        &self.creds.storage_bucket
    }

    fn strategy(&self) -> StorageStrategy {
        StorageStrategy::FormPost
    }
}
