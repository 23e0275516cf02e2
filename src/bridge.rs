//! Async task bridge between host calls and background jobs.
//!
//! A host call returns a [`JobHandle`] straight away. The job body runs on
//! the tokio runtime, and the handle resolves exactly once with the output
//! bytes or a [`JobRejection`]. Panics inside a job become `InternalFault`
//! rejections instead of tearing down the host.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinError;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{ErrorKind, Result, SlidemixError};

/// Lifecycle of one job. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobState {
    Created,
    Validating,
    Planning,
    Executing,
    Resolved,
    Rejected,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Resolved | JobState::Rejected)
    }
}

/// Failure delivered to the host when a job does not produce output
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[{kind}] {message}")]
pub struct JobRejection {
    pub kind: ErrorKind,
    pub message: String,
}

impl JobRejection {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InternalFault,
            message: message.into(),
        }
    }
}

impl From<SlidemixError> for JobRejection {
    fn from(err: SlidemixError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

pub type JobResult = std::result::Result<Vec<u8>, JobRejection>;

/// Job-side view of the lifecycle, handed to the job body
pub struct JobTracker {
    id: Uuid,
    state: watch::Sender<JobState>,
}

impl JobTracker {
    fn new(id: Uuid) -> (Self, watch::Receiver<JobState>) {
        let (state, rx) = watch::channel(JobState::Created);
        (Self { id, state }, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Move to `next`. Backward moves and moves out of a terminal state are
    /// ignored; returns whether the state changed.
    pub fn advance(&self, next: JobState) -> bool {
        self.state.send_if_modified(|current| {
            if current.is_terminal() || next <= *current {
                return false;
            }
            *current = next;
            true
        })
    }
}

/// Host-side handle for one submitted job.
///
/// Awaiting the handle yields the job's single outcome.
pub struct JobHandle {
    id: Uuid,
    state: watch::Receiver<JobState>,
    result: oneshot::Receiver<JobResult>,
}

impl JobHandle {
    /// A handle that is already rejected, for calls refused before any work
    /// is scheduled.
    pub fn rejected(rejection: impl Into<JobRejection>) -> Self {
        let (tracker, state) = JobTracker::new(Uuid::new_v4());
        let (tx, result) = oneshot::channel();
        tracker.advance(JobState::Rejected);
        let _ = tx.send(Err(rejection.into()));
        Self {
            id: tracker.id,
            state,
            result,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Watch the job's state transitions
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.clone()
    }
}

impl Future for JobHandle {
    type Output = JobResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.result).poll(cx).map(|outcome| {
            outcome.unwrap_or_else(|_| Err(JobRejection::internal("job ended without a result")))
        })
    }
}

/// Run `body` as a background job on `runtime`.
pub fn spawn<F, Fut>(runtime: &Handle, kind: &'static str, body: F) -> JobHandle
where
    F: FnOnce(Arc<JobTracker>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
{
    let (tracker, state) = JobTracker::new(Uuid::new_v4());
    let id = tracker.id;
    let tracker = Arc::new(tracker);
    let (tx, result) = oneshot::channel();
    let span = info_span!("job", id = %id, kind);

    let job_tracker = tracker.clone();
    let work = runtime.spawn(async move { body(job_tracker).await }.instrument(span.clone()));

    runtime.spawn(async move {
        let outcome = match work.await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => Err(JobRejection::from(e)),
            Err(e) => Err(rejection_from_join(e)),
        };

        span.in_scope(|| match &outcome {
            Ok(bytes) => {
                tracker.advance(JobState::Resolved);
                info!("Job resolved with {} bytes", bytes.len());
            }
            Err(rejection) => {
                tracker.advance(JobState::Rejected);
                warn!("Job rejected: {}", rejection);
            }
        });

        let _ = tx.send(outcome);
    });

    JobHandle { id, state, result }
}

fn rejection_from_join(err: JoinError) -> JobRejection {
    if err.is_cancelled() {
        return JobRejection::internal("job was cancelled");
    }
    match err.try_into_panic() {
        Ok(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            JobRejection::internal(format!("job panicked: {}", detail))
        }
        Err(err) => JobRejection::internal(format!("job failed: {}", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ready;

    #[test]
    fn test_rejected_handle_is_ready_without_runtime() {
        let handle = JobHandle::rejected(SlidemixError::InvalidInput("bad call".to_string()));
        assert_eq!(handle.state(), JobState::Rejected);

        let mut task = tokio_test::task::spawn(handle);
        let outcome = assert_ready!(task.poll());
        let rejection = outcome.unwrap_err();
        assert_eq!(rejection.kind, ErrorKind::InvalidInput);
        assert_eq!(rejection.message, "bad call");
    }

    #[tokio::test]
    async fn test_resolves_with_output() {
        let handle = spawn(&Handle::current(), "test", |tracker| async move {
            tracker.advance(JobState::Validating);
            tracker.advance(JobState::Executing);
            Ok(vec![1, 2, 3])
        });

        let mut states = handle.subscribe();
        assert_eq!(handle.await, Ok(vec![1, 2, 3]));
        assert_eq!(*states.borrow_and_update(), JobState::Resolved);
    }

    #[tokio::test]
    async fn test_error_kind_is_preserved() {
        let handle = spawn(&Handle::current(), "test", |_| async move {
            Err(SlidemixError::Tool("exit status: 1".to_string()))
        });
        let rejection = handle.await.unwrap_err();
        assert_eq!(rejection.kind, ErrorKind::ToolFailure);
        assert_eq!(rejection.to_string(), "[ToolFailure] exit status: 1");
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_fault() {
        let handle = spawn(&Handle::current(), "test", |_| async move {
            if true {
                panic!("planner exploded");
            }
            Ok(Vec::new())
        });
        let id = handle.id();
        let states = handle.subscribe();

        let rejection = handle.await.unwrap_err();
        assert_eq!(rejection.kind, ErrorKind::InternalFault);
        assert!(rejection.message.contains("planner exploded"));
        assert_eq!(*states.borrow(), JobState::Rejected);
        assert!(!id.is_nil());
    }

    #[test]
    fn test_states_only_move_forward() {
        let (tracker, rx) = JobTracker::new(Uuid::new_v4());
        assert!(tracker.advance(JobState::Planning));
        assert!(!tracker.advance(JobState::Validating));
        assert!(!tracker.advance(JobState::Planning));
        assert!(tracker.advance(JobState::Rejected));
        assert!(!tracker.advance(JobState::Resolved));
        assert_eq!(*rx.borrow(), JobState::Rejected);
        assert_eq!(tracker.state(), JobState::Rejected);
    }
}
