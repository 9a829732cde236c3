//! Engine error types.
//!
//! `InsufficientCredits` and `NotCancellable` are user-facing and returned
//! synchronously from orchestrator calls. Everything inside the worker loop
//! is recovered locally and recorded on the job, never surfaced here.

use scribe_core::{JobId, JobStatus};
use scribe_queue::QueueError;
use scribe_store::StoreError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors returned by the orchestrator API.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The user's balance cannot cover the estimated cost. No job or
    /// reservation was created.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current spendable balance.
        balance: i64,
        /// Estimated credits the job requires.
        required: i64,
    },

    /// Cancel was attempted on a job that is past `Queued`.
    #[error("job {job_id} is not cancellable in status {status:?}")]
    NotCancellable {
        /// The job in question.
        job_id: JobId,
        /// Its current status.
        status: JobStatus,
    },

    /// No job exists with this ID.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// The broker rejected the operation. Submissions fail closed: no job
    /// or reservation is left behind.
    #[error("broker error: {0}")]
    Broker(#[from] QueueError),

    /// Storage-level failure.
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            StoreError::NotCancellable { job_id, status } => {
                Self::NotCancellable { job_id, status }
            }
            other => Self::Store(other),
        }
    }
}
