//! Upload orchestration
//!
//! Sequences credential fetch, transfer and registration for one upload and
//! owns its single outward event channel. Uploads started from the same
//! orchestrator share nothing mutable.

use std::sync::Arc;
use std::time::Duration;

use dataship_api_client::{ApiClient, CreateUploadRequest, CredentialFetcher, DatasetRegistrar};
use dataship_core::constants::{DEFAULT_PROGRESS_INTERVAL, DEFAULT_REQUEST_TIMEOUT};
use dataship_core::validation::derive_display_name_from_url;
use dataship_core::{
    Credentials, DatasetRecord, ErrorMetadata, LogLevel, Payload, ProgressSnapshot,
    ServiceConfig, UploadConfig, ValidatedUpload, ValidationError,
};
use dataship_storage::{CredentialStorageProvider, StorageProvider};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::UploadError;
use crate::events::{UploadEvent, UploadState};
use crate::progress::ProgressMeter;
use crate::source::open_payload;
use crate::uploader::StreamUploader;

/// Starts uploads.
#[derive(Clone)]
pub struct UploadOrchestrator {
    storage: Arc<dyn StorageProvider>,
    progress_interval: Duration,
    request_timeout: Duration,
}

impl Default for UploadOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadOrchestrator {
    pub fn new() -> Self {
        Self {
            storage: Arc::new(CredentialStorageProvider::default()),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Orchestrator using the storage strategy, endpoint, proxy and timings
    /// of a service configuration.
    pub fn from_service_config(config: &ServiceConfig) -> Self {
        Self {
            storage: Arc::new(CredentialStorageProvider::new(
                config.storage_strategy,
                config.storage_endpoint.clone(),
                config.proxy_url.clone(),
            )),
            progress_interval: config.progress_interval,
            request_timeout: config.request_timeout,
        }
    }

    pub fn with_storage_provider(mut self, storage: Arc<dyn StorageProvider>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Validate `config` and start the upload in the background.
    ///
    /// Validation failures are returned here, before any network call; a
    /// caller-supplied stream is closed in that case. Otherwise the returned
    /// handle delivers progress and then exactly one terminal event.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, config: UploadConfig) -> Result<UploadHandle, UploadError> {
        let (upload, payload) = config.validate().map_err(|e| {
            tracing::debug!(error = %e, "Upload configuration rejected");
            UploadError::from(e)
        })?;

        let api = ApiClient::for_upload(&upload, self.request_timeout)
            .map_err(UploadError::CredentialFetch)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(UploadState::Init);
        let cancel = CancellationToken::new();

        let run = UploadRun {
            upload,
            api,
            storage: self.storage.clone(),
            progress_interval: self.progress_interval,
            events: events_tx,
            state: state_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(run.execute(payload));

        Ok(UploadHandle {
            events: events_rx,
            state: state_rx,
            cancel: cancel.clone(),
            _detach: cancel.drop_guard(),
            task,
        })
    }

    /// Register an object that is already hosted at `url`, skipping the
    /// credential and transfer phases. A payload in `config` is ignored.
    ///
    /// Without a display name, the URL's file name (minus extension) is used.
    pub async fn create_from_url(
        &self,
        config: UploadConfig,
        url: &str,
    ) -> Result<DatasetRecord, UploadError> {
        let mut upload = config.validate_registration()?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(UploadError::ConfigValidation(
                ValidationError::InvalidField {
                    field: "url",
                    reason: format!("\"{url}\" is not an http(s) URL"),
                },
            ));
        }

        if upload.display_name.is_none() {
            upload.display_name = derive_display_name_from_url(url);
        }

        let api = ApiClient::for_upload(&upload, self.request_timeout)
            .map_err(UploadError::Registration)?;
        register(&api, &upload, url.to_string()).await
    }
}

/// Everything one background upload owns.
struct UploadRun {
    upload: ValidatedUpload,
    api: ApiClient,
    storage: Arc<dyn StorageProvider>,
    progress_interval: Duration,
    events: mpsc::UnboundedSender<UploadEvent>,
    state: watch::Sender<UploadState>,
    cancel: CancellationToken,
}

impl UploadRun {
    fn advance(&self, next: UploadState) {
        let current = *self.state.borrow();
        if current.can_transition_to(next) {
            self.state.send_replace(next);
            tracing::debug!(
                dataset_id = %self.upload.dataset_id,
                from = %current,
                to = %next,
                "Upload state changed"
            );
        } else {
            tracing::warn!(from = %current, to = %next, "Ignoring invalid upload state change");
        }
    }

    fn emit(&self, event: UploadEvent) {
        // the handle may be gone; the upload is then being canceled anyway
        let _ = self.events.send(event);
    }

    async fn execute(self, payload: Payload) {
        let start = std::time::Instant::now();
        let outcome = self.phases(payload).await;

        match outcome {
            Ok(record) => {
                self.advance(UploadState::Done);
                tracing::info!(
                    dataset_id = %self.upload.dataset_id,
                    upload_id = %record.id,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Upload finished"
                );
                self.emit(UploadEvent::Finished(record));
            }
            Err(err) => {
                self.advance(UploadState::Failed);
                match err.log_level() {
                    LogLevel::Debug => tracing::debug!(
                        dataset_id = %self.upload.dataset_id,
                        error_code = err.error_code(),
                        error = %err,
                        "Upload ended"
                    ),
                    LogLevel::Warn => tracing::warn!(
                        dataset_id = %self.upload.dataset_id,
                        error_code = err.error_code(),
                        status = ?err.status_code(),
                        error = %err,
                        "Upload failed"
                    ),
                    LogLevel::Error => tracing::error!(
                        dataset_id = %self.upload.dataset_id,
                        error_code = err.error_code(),
                        status = ?err.status_code(),
                        error = %err,
                        "Upload failed"
                    ),
                }
                self.emit(UploadEvent::Error(err));
            }
        }
    }

    async fn phases(&self, payload: Payload) -> Result<DatasetRecord, UploadError> {
        let source = open_payload(payload).await?;

        self.advance(UploadState::FetchingCredentials);
        let creds = self.fetch_credentials(&self.api).await?;

        let writer = self.storage.writer_for(&creds)?;
        let uploader = StreamUploader::new(writer);

        self.advance(UploadState::Transferring);
        let meter = ProgressMeter::new(self.progress_interval);
        let progress = self.events.clone();
        let ticker = meter.start(move |snapshot: ProgressSnapshot| {
            let _ = progress.send(UploadEvent::Progress(snapshot));
        });

        let transferred = uploader.upload(&creds, source, &meter, &self.cancel).await;
        // no progress may follow the terminal event
        ticker.stop().await;
        let written = transferred?;
        self.emit(UploadEvent::Progress(meter.final_snapshot()));

        if self.cancel.is_cancelled() {
            return Err(UploadError::Canceled);
        }

        self.advance(UploadState::RegisteringDataset);
        register(&self.api, &self.upload, written.url).await
    }

    async fn fetch_credentials(
        &self,
        fetcher: &dyn CredentialFetcher,
    ) -> Result<Credentials, UploadError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(UploadError::Canceled),
            creds = fetcher.fetch_credentials(&self.upload.account) => {
                creds.map_err(UploadError::CredentialFetch)
            }
        }
    }
}

async fn register(
    registrar: &dyn DatasetRegistrar,
    upload: &ValidatedUpload,
    url: String,
) -> Result<DatasetRecord, UploadError> {
    let request = CreateUploadRequest {
        url,
        tileset: upload.dataset_id.clone(),
        name: upload.display_name.clone(),
        patch: upload.patch_existing,
    };

    registrar
        .register_dataset(&upload.account, &request)
        .await
        .map_err(UploadError::Registration)
}

/// Handle onto a running upload.
///
/// Dropping the handle detaches the sink: the transfer is canceled and the
/// source closed.
pub struct UploadHandle {
    events: mpsc::UnboundedReceiver<UploadEvent>,
    state: watch::Receiver<UploadState>,
    cancel: CancellationToken,
    _detach: DropGuard,
    task: JoinHandle<()>,
}

impl UploadHandle {
    /// Next event, or `None` once the terminal event has been consumed.
    pub async fn next_event(&mut self) -> Option<UploadEvent> {
        self.events.recv().await
    }

    /// Request cancellation. The upload still ends with one terminal event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> UploadState {
        *self.state.borrow()
    }

    /// Drain events until the upload ends.
    pub async fn wait(self) -> Result<DatasetRecord, UploadError> {
        self.wait_with_progress(|_| {}).await
    }

    /// Drain events, handing each progress snapshot to `on_progress`.
    pub async fn wait_with_progress<F>(
        mut self,
        mut on_progress: F,
    ) -> Result<DatasetRecord, UploadError>
    where
        F: FnMut(&ProgressSnapshot),
    {
        while let Some(event) = self.events.recv().await {
            match event {
                UploadEvent::Progress(snapshot) => on_progress(&snapshot),
                UploadEvent::Finished(record) => return Ok(record),
                UploadEvent::Error(err) => return Err(err),
            }
        }

        let reason = match (&mut self.task).await {
            Err(e) if e.is_panic() => "upload task panicked".to_string(),
            Err(e) => e.to_string(),
            Ok(()) => "upload ended without an outcome".to_string(),
        };
        Err(UploadError::Interrupted(reason))
    }
}

impl std::fmt::Debug for UploadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadHandle")
            .field("state", &self.state())
            .field("canceled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

