//! Credit reservations and the ledger audit trail.
//!
//! A [`CreditReservation`] holds credits against a user for exactly one job
//! until it is released, either by settling (deduct actual usage, refund the
//! delta) or by a full refund on cancellation/dead-letter. Every balance
//! change also produces a [`LedgerEntry`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntryId, JobId, ReservationId, UserId};

/// Status of a credit reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Credits are held; the job is still in flight.
    Held,

    /// Released by settling: actual usage deducted, remainder refunded.
    Settled,

    /// Released by a full refund (cancel or dead-letter).
    Refunded,
}

impl ReservationStatus {
    /// Check whether the reservation has already been released.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        matches!(self, Self::Settled | Self::Refunded)
    }
}

/// An amount of credit held against a user for a specific job.
///
/// Created atomically with the job; released exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditReservation {
    /// Unique reservation ID (ULID for time-ordering).
    pub id: ReservationId,

    /// The user the credits are held against.
    pub user_id: UserId,

    /// The job this reservation belongs to. Always exactly one per job.
    pub job_id: JobId,

    /// Amount of credits held.
    pub amount: i64,

    /// Current status.
    pub status: ReservationStatus,

    /// When the reservation was created.
    pub created_at: DateTime<Utc>,

    /// When the reservation was released (settled or refunded).
    pub released_at: Option<DateTime<Utc>>,
}

impl CreditReservation {
    /// Create a new held reservation.
    #[must_use]
    pub fn new(user_id: UserId, job_id: JobId, amount: i64) -> Self {
        Self {
            id: ReservationId::generate(),
            user_id,
            job_id,
            amount,
            status: ReservationStatus::Held,
            created_at: Utc::now(),
            released_at: None,
        }
    }
}

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Credits granted to the account (purchase, plan allowance, bonus).
    Grant,

    /// Credits held for a job at submission time.
    Reserve,

    /// Reservation settled: the unused remainder returned to the balance.
    Settle,

    /// Reservation refunded in full (cancel or dead-letter).
    Refund,
}

impl EntryKind {
    /// Check if this entry kind adds credits back to the spendable balance.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Grant | Self::Settle | Self::Refund)
    }
}

/// A ledger entry recording one balance change.
///
/// Entries use ULIDs for time-ordered IDs and are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (ULID for time-ordering).
    pub id: EntryId,

    /// The user whose balance changed.
    pub user_id: UserId,

    /// The job involved, if the change belongs to one.
    pub job_id: Option<JobId>,

    /// Amount. Positive = credit, negative = debit.
    pub amount: i64,

    /// Kind of change.
    pub kind: EntryKind,

    /// Spendable balance after this entry.
    pub balance_after: i64,

    /// Human-readable description.
    pub description: String,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create a grant entry.
    #[must_use]
    pub fn grant(user_id: UserId, amount: i64, balance_after: i64, description: String) -> Self {
        Self {
            id: EntryId::generate(),
            user_id,
            job_id: None,
            amount,
            kind: EntryKind::Grant,
            balance_after,
            description,
            created_at: Utc::now(),
        }
    }

    /// Create a reserve entry (always a debit).
    #[must_use]
    pub fn reserve(user_id: UserId, job_id: JobId, amount: i64, balance_after: i64) -> Self {
        Self {
            id: EntryId::generate(),
            user_id,
            job_id: Some(job_id),
            amount: -amount.abs(),
            kind: EntryKind::Reserve,
            balance_after,
            description: format!("Reserved {amount} credits for generation job"),
            created_at: Utc::now(),
        }
    }

    /// Create a settle entry for the refunded remainder of a reservation.
    #[must_use]
    pub fn settle(user_id: UserId, job_id: JobId, refunded: i64, balance_after: i64) -> Self {
        Self {
            id: EntryId::generate(),
            user_id,
            job_id: Some(job_id),
            amount: refunded,
            kind: EntryKind::Settle,
            balance_after,
            description: format!("Settled reservation, {refunded} unused credits returned"),
            created_at: Utc::now(),
        }
    }

    /// Create a full-refund entry.
    #[must_use]
    pub fn refund(
        user_id: UserId,
        job_id: JobId,
        amount: i64,
        balance_after: i64,
        reason: String,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            user_id,
            job_id: Some(job_id),
            amount,
            kind: EntryKind::Refund,
            balance_after,
            description: reason,
            created_at: Utc::now(),
        }
    }
}
