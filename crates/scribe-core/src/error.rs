//! Error types for scribe-core.

use crate::ids::IdError;
use crate::job::JobStatus;
use crate::JobId;

/// Result type for scribe-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in core domain operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Illegal job state machine transition.
    #[error("invalid transition for job {job_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// The job being transitioned.
        job_id: JobId,
        /// The current status.
        from: JobStatus,
        /// The attempted target status.
        to: JobStatus,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
