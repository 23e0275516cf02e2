//! Progress reporting for media jobs.
//!
//! Jobs report integer percentages through a [`ProgressReporter`], which
//! keeps the sequence non-decreasing and forwards it to whatever
//! [`ProgressSink`] the host registered. Sinks are advisory: a failing or
//! panicking sink is logged and otherwise ignored.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// One percentage update for one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub job_id: Uuid,
    pub percent: u8,
}

/// Host-side destination for progress updates
#[cfg_attr(test, mockall::automock)]
pub trait ProgressSink: Send + Sync {
    fn report(&self, job_id: Uuid, percent: u8) -> anyhow::Result<()>;
}

/// Calls a host-registered function with each percentage
pub struct CallbackSink<F> {
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: Fn(u8) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressSink for CallbackSink<F>
where
    F: Fn(u8) + Send + Sync,
{
    fn report(&self, _job_id: Uuid, percent: u8) -> anyhow::Result<()> {
        (self.callback)(percent);
        Ok(())
    }
}

/// Forwards updates over a bounded channel without blocking
pub struct ChannelSink {
    tx: mpsc::Sender<ProgressUpdate>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ProgressUpdate>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver that collects its updates
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, job_id: Uuid, percent: u8) -> anyhow::Result<()> {
        self.tx
            .try_send(ProgressUpdate { job_id, percent })
            .map_err(|e| anyhow::anyhow!("progress channel unavailable: {}", e))
    }
}

/// Per-job progress front end
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: Uuid,
    sink: Option<Arc<dyn ProgressSink>>,
    // percent + 1 of the last update; 0 before the first one
    last: Arc<AtomicU16>,
}

impl ProgressReporter {
    pub fn new(job_id: Uuid, sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self {
            job_id,
            sink,
            last: Arc::new(AtomicU16::new(0)),
        }
    }

    /// A reporter that only keeps track of the last value
    pub fn silent(job_id: Uuid) -> Self {
        Self::new(job_id, None)
    }

    /// Last percentage forwarded, if any
    pub fn last(&self) -> Option<u8> {
        match self.last.load(Ordering::SeqCst) {
            0 => None,
            n => Some((n - 1) as u8),
        }
    }

    /// Report a percentage. Values above 100 are clamped; values not above
    /// the last report are dropped.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.last.fetch_max(u16::from(percent) + 1, Ordering::SeqCst);
        if u16::from(percent) + 1 <= previous {
            return;
        }

        debug!(job = %self.job_id, "Progress {}%", percent);
        let Some(sink) = &self.sink else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| sink.report(self.job_id, percent))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(job = %self.job_id, "Progress sink rejected update: {}", e),
            Err(_) => warn!(job = %self.job_id, "Progress sink panicked, update dropped"),
        }
    }

    /// Report a position inside the `[from, to]` percentage band.
    pub fn report_within(&self, from: u8, to: u8, fraction: f64) {
        if !fraction.is_finite() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        let span = f64::from(to.saturating_sub(from));
        self.report(from + (span * fraction) as u8);
    }
}
