//! Transfer progress accounting.
//!
//! A [`ProgressMeter`] counts bytes as they flow through a [`MeteredReader`]
//! and a [`MeterTicker`] turns the count into periodic [`ProgressSnapshot`]s.
//! The total length may be known up front, arrive later, or never arrive.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use dataship_core::ProgressSnapshot;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Weight of the newest interval in the smoothed transfer rate.
const RATE_SMOOTHING: f64 = 0.3;

#[derive(Default)]
struct RateWindow {
    last_at: Option<Instant>,
    /// Bytes per second
    smoothed: Option<f64>,
}

#[derive(Default)]
struct MeterState {
    transferred: AtomicU64,
    /// Value of `transferred` at the previous snapshot
    last_reported: AtomicU64,
    total: Mutex<Option<u64>>,
    deferred_total: Mutex<Option<oneshot::Receiver<u64>>>,
    rate: Mutex<RateWindow>,
}

impl MeterState {
    /// Fold `delta` bytes into the smoothed rate, measured over the real time
    /// since the previous observation.
    fn observe_rate(&self, delta: u64, fallback: Duration) -> f64 {
        let mut window = match self.rate.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        let elapsed = window
            .last_at
            .map(|at| now.duration_since(at))
            .filter(|elapsed| !elapsed.is_zero())
            .unwrap_or(fallback);
        window.last_at = Some(now);

        let secs = elapsed.as_secs_f64();
        let current = if secs > 0.0 { delta as f64 / secs } else { 0.0 };
        let rate = match window.smoothed {
            Some(previous) => RATE_SMOOTHING * current + (1.0 - RATE_SMOOTHING) * previous,
            None => current,
        };
        window.smoothed = Some(rate);
        rate
    }

    fn total(&self) -> Option<u64> {
        let mut total = match self.total.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if total.is_none() {
            if let Ok(mut deferred) = self.deferred_total.lock() {
                if let Some(rx) = deferred.as_mut() {
                    match rx.try_recv() {
                        Ok(length) => {
                            *total = Some(length);
                            *deferred = None;
                        }
                        Err(oneshot::error::TryRecvError::Closed) => *deferred = None,
                        Err(oneshot::error::TryRecvError::Empty) => {}
                    }
                }
            }
        }
        *total
    }
}

/// Counts transferred bytes against a possibly late-bound total.
///
/// Cloning yields another handle onto the same counters.
#[derive(Clone)]
pub struct ProgressMeter {
    state: Arc<MeterState>,
    interval: Duration,
}

impl ProgressMeter {
    pub fn new(interval: Duration) -> Self {
        let state = MeterState {
            rate: Mutex::new(RateWindow {
                last_at: Some(Instant::now()),
                smoothed: None,
            }),
            ..MeterState::default()
        };
        Self {
            state: Arc::new(state),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_total(&self, length: u64) {
        let mut total = match self.state.total.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *total = Some(length);
    }

    /// Pick the total up from `rx` whenever the producer reports it.
    pub fn defer_total(&self, rx: oneshot::Receiver<u64>) {
        if let Ok(mut deferred) = self.state.deferred_total.lock() {
            *deferred = Some(rx);
        }
    }

    pub fn total(&self) -> Option<u64> {
        self.state.total()
    }

    pub fn transferred(&self) -> u64 {
        self.state.transferred.load(Ordering::Acquire)
    }

    /// Wrap a reader so every byte it yields is counted.
    pub fn wrap<R>(&self, inner: R) -> MeteredReader<R>
    where
        R: AsyncRead + Unpin,
    {
        MeteredReader {
            inner,
            state: self.state.clone(),
        }
    }

    /// Snapshot since the previous one; advances the interval baseline.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let transferred = self.transferred();
        let previous = self
            .state
            .last_reported
            .swap(transferred, Ordering::AcqRel);
        let delta = transferred.saturating_sub(previous);
        let rate = self.state.observe_rate(delta, self.interval);
        compute_snapshot(transferred, self.total(), delta, rate)
    }

    /// Snapshot taken once the transfer is acknowledged.
    ///
    /// Reports 100% only when the declared total matches the bytes actually
    /// transferred. A mismatch is logged and left visible in the snapshot.
    pub fn final_snapshot(&self) -> ProgressSnapshot {
        let mut snapshot = self.snapshot();
        match snapshot.total_bytes {
            Some(total) if total == snapshot.bytes_transferred => {
                snapshot.percentage = Some(100.0);
                snapshot.remaining_bytes = Some(0);
                snapshot.eta_seconds = Some(0.0);
            }
            Some(total) => {
                tracing::warn!(
                    declared = total,
                    transferred = snapshot.bytes_transferred,
                    "Transferred byte count differs from the declared length"
                );
            }
            None => {}
        }
        snapshot
    }

    /// Emit a snapshot to `callback` on every interval tick until stopped.
    pub fn start<F>(&self, callback: F) -> MeterTicker
    where
        F: Fn(ProgressSnapshot) + Send + Sync + 'static,
    {
        let meter = self.clone();
        let stop = CancellationToken::new();
        let stopped = stop.clone();

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + meter.interval;
            let mut ticker = tokio::time::interval_at(start, meter.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = stopped.cancelled() => break,
                    _ = ticker.tick() => {
                        let snapshot = meter.snapshot();
                        tracing::debug!(
                            bytes = snapshot.bytes_transferred,
                            total = ?snapshot.total_bytes,
                            "Progress tick"
                        );
                        callback(snapshot);
                    }
                }
            }
        });

        MeterTicker {
            stop,
            task: Some(task),
        }
    }
}

/// Background task emitting periodic snapshots.
pub struct MeterTicker {
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MeterTicker {
    /// Stop ticking. No callback runs after this returns.
    pub async fn stop(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Progress ticker ended abnormally");
            }
        }
    }
}

impl Drop for MeterTicker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Reader adapter that feeds a [`ProgressMeter`].
pub struct MeteredReader<R> {
    inner: R,
    state: Arc<MeterState>,
}

impl<R> MeteredReader<R> {
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for MeteredReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let read = (buf.filled().len() - before) as u64;
            if read > 0 {
                self.state.transferred.fetch_add(read, Ordering::AcqRel);
            }
        }
        poll
    }
}

/// Pure snapshot calculation.
///
/// `delta` is the byte count since the previous snapshot, `rate` the
/// transfer rate in bytes per second. Length-dependent fields stay `None`
/// while `total` is unknown.
pub fn compute_snapshot(
    transferred: u64,
    total: Option<u64>,
    delta: u64,
    rate: f64,
) -> ProgressSnapshot {
    let percentage = total.map(|total| {
        if total == 0 {
            100.0
        } else {
            transferred as f64 / total as f64 * 100.0
        }
    });
    let remaining = total.map(|total| total.saturating_sub(transferred));

    let eta_seconds = match remaining {
        Some(0) => Some(0.0),
        Some(remaining) if rate > 0.0 => Some(remaining as f64 / rate),
        _ => None,
    };

    ProgressSnapshot {
        bytes_transferred: transferred,
        total_bytes: total,
        percentage,
        bytes_per_interval: delta,
        remaining_bytes: remaining,
        eta_seconds,
    }
}
