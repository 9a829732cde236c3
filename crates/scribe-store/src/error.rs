//! Error types for Scribe storage.

use scribe_core::{JobId, JobStatus, ReservationId};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found")]
    NotFound,

    /// Insufficient credits for a reservation.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current spendable balance.
        balance: i64,
        /// Amount the reservation requires.
        required: i64,
    },

    /// The reservation was already released (settled or refunded).
    ///
    /// Settle and refund are released-exactly-once operations; a second
    /// release attempt is a programming-invariant violation, never a
    /// double-refund.
    #[error("reservation {reservation_id} already settled")]
    AlreadySettled {
        /// The reservation that was already released.
        reservation_id: ReservationId,
    },

    /// The job is not in a state that permits cancellation.
    #[error("job {job_id} is not cancellable in status {status:?}")]
    NotCancellable {
        /// The job in question.
        job_id: JobId,
        /// Its current status.
        status: JobStatus,
    },

    /// Illegal job state machine transition.
    #[error(transparent)]
    InvalidTransition(#[from] scribe_core::CoreError),
}
