//! `RocksDB` storage layer for Scribe.
//!
//! This crate is the durable source of truth for generation jobs, credit
//! accounts, reservations, and the ledger audit trail, using `RocksDB`
//! with column families for efficient indexing.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `accounts`: Credit accounts, keyed by `user_id`
//! - `jobs`: Generation jobs, keyed by `job_id`
//! - `jobs_by_user`: Index for listing a user's jobs chronologically
//! - `reservations`: Credit reservations, keyed by `reservation_id` (ULID)
//! - `reservations_by_job`: Index mapping a job to its single reservation
//! - `ledger` / `ledger_by_user`: Balance audit trail
//!
//! All compound operations (reserve, settle, refund, job transitions) are
//! written as a single atomic batch under an internal write lock, so two
//! concurrent reservations for the same user can never both pass the
//! balance check.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use scribe_core::{
    Account, CreditReservation, EntryId, Job, JobId, JobStatus, LedgerEntry, ReservationId, UserId,
};

/// Outcome of a worker claiming a delivered message's job.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// The job was transitioned to `Processing` for this attempt.
    Claimed(Job),

    /// The job is already terminal (completed, dead-lettered, or
    /// cancelled); the delivery should be acknowledged and dropped.
    Superseded(JobStatus),
}

/// Filter for listing a user's job history.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobFilter {
    /// Only include jobs in this status, if set.
    pub status: Option<JobStatus>,
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (e.g. `RocksDB`, in-memory for testing). Implementations
/// must support concurrent callers; per-key writes are atomic.
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Add credits to an account, creating it if it does not exist.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn grant_credits(&self, user_id: &UserId, amount: i64, description: &str) -> Result<i64>;

    /// Get the spendable balance for a user.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn balance(&self, user_id: &UserId) -> Result<i64>;

    // =========================================================================
    // Reservation Operations (the credit ledger)
    // =========================================================================

    /// Atomically reserve credits for a job, persisting the job with them.
    ///
    /// Holds the job's `estimated_credits`. The `Queued` job record, the
    /// reservation, the balance deduction, and the ledger entry are one
    /// atomic batch, so a crash can never leave a held reservation without
    /// a job record to reach it through, and a reservation can never push
    /// the balance negative.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientCredits` if the balance is too low;
    ///   nothing is written.
    fn reserve(&self, job: &Job) -> Result<CreditReservation>;

    /// Settle a reservation: deduct `actual` usage, refund the remainder.
    ///
    /// Returns the refunded amount. Released exactly once.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the reservation doesn't exist.
    /// - `StoreError::AlreadySettled` if it was already released.
    fn settle(&self, reservation_id: &ReservationId, actual: i64) -> Result<i64>;

    /// Refund a reservation in full (cancel or dead-letter).
    ///
    /// Returns the refunded amount. Released exactly once.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the reservation doesn't exist.
    /// - `StoreError::AlreadySettled` if it was already released.
    fn refund_full(&self, reservation_id: &ReservationId, reason: &str) -> Result<i64>;

    /// Get a reservation by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_reservation(&self, reservation_id: &ReservationId)
        -> Result<Option<CreditReservation>>;

    /// Get the reservation for a job (always exactly one per job).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn reservation_for_job(&self, job_id: &JobId) -> Result<Option<CreditReservation>>;

    /// List ledger entries for a user, ordered by time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    /// Get a ledger entry by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_ledger_entry(&self, entry_id: &EntryId) -> Result<Option<LedgerEntry>>;

    // =========================================================================
    // Job Operations
    // =========================================================================

    /// Insert or update a job record.
    ///
    /// This also maintains the user index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_job(&self, job: &Job) -> Result<()>;

    /// Get a job by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_job(&self, job_id: &JobId) -> Result<Option<Job>>;

    /// List jobs for a user, ordered by submission time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_jobs_by_user(
        &self,
        user_id: &UserId,
        filter: &JobFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>>;

    // =========================================================================
    // Job State Transitions (idempotent on (job_id, attempt))
    // =========================================================================

    /// Claim a job for processing attempt `attempt`.
    ///
    /// Terminal jobs yield `ClaimOutcome::Superseded` so a redelivered
    /// message becomes an acknowledged no-op. The attempt counter never
    /// moves backwards.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the job doesn't exist.
    fn begin_attempt(&self, job_id: &JobId, attempt: u32) -> Result<ClaimOutcome>;

    /// Complete a job, recording actual usage and the generated text.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the job doesn't exist.
    /// - `StoreError::InvalidTransition` unless the job is `Processing`.
    fn complete_job(&self, job_id: &JobId, actual_credits: i64, output_text: &str) -> Result<Job>;

    /// Record a retryable failure, moving the job to `FailedRetry`.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the job doesn't exist.
    /// - `StoreError::InvalidTransition` unless the job is `Processing`.
    fn record_retry(&self, job_id: &JobId, error: &str) -> Result<Job>;

    /// Move a job to `DeadLettered` with its final error.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the job doesn't exist.
    /// - `StoreError::InvalidTransition` if the job is already terminal.
    fn dead_letter_job(&self, job_id: &JobId, error: &str) -> Result<Job>;

    /// Cancel a job. Authoritative only while the job is `Queued`.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the job doesn't exist.
    /// - `StoreError::NotCancellable` if the job is past `Queued`.
    fn cancel_job(&self, job_id: &JobId) -> Result<Job>;

    /// Record generated output on a job without touching its status.
    ///
    /// Used when a worker finishes a job that was cancelled mid-flight:
    /// the text is still surfaced to the user, the status stays terminal.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the job doesn't exist.
    fn record_late_output(&self, job_id: &JobId, output_text: &str) -> Result<()>;
}
