//! Key encoding utilities for `RocksDB`.
//!
//! Index keys concatenate fixed-width components so that prefix iteration
//! yields records in a useful order (time-ordered for ULIDs and for the
//! job index, which embeds the creation timestamp).

use chrono::{DateTime, Utc};
use scribe_core::{EntryId, JobId, ReservationId, UserId};

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a job key from a job ID.
#[must_use]
pub fn job_key(job_id: &JobId) -> Vec<u8> {
    job_id.as_bytes().to_vec()
}

/// Create a user-job index key.
///
/// Format: `user_id (16 bytes) || created_at millis (8 bytes, big-endian) || job_id (16 bytes)`
///
/// The embedded timestamp orders a user's jobs chronologically under the
/// user prefix; job IDs are random UUIDs, so the timestamp must be explicit.
#[must_use]
pub fn user_job_key(user_id: &UserId, created_at: DateTime<Utc>, job_id: &JobId) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(user_id.as_bytes());
    #[allow(clippy::cast_sign_loss)]
    key.extend_from_slice(&(created_at.timestamp_millis() as u64).to_be_bytes());
    key.extend_from_slice(job_id.as_bytes());
    key
}

/// Create a prefix for iterating all jobs for a user.
#[must_use]
pub fn user_jobs_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the job ID from a user-job index key.
///
/// # Panics
///
/// Panics if the key is not at least 40 bytes.
#[must_use]
pub fn extract_job_id_from_user_key(key: &[u8]) -> JobId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[24..40]);
    JobId::from_uuid(uuid::Uuid::from_bytes(bytes))
}

/// Create a reservation key from a reservation ID.
#[must_use]
pub fn reservation_key(reservation_id: &ReservationId) -> Vec<u8> {
    reservation_id.to_bytes().to_vec()
}

/// Create a job-to-reservation index key.
#[must_use]
pub fn reservation_by_job_key(job_id: &JobId) -> Vec<u8> {
    job_id.as_bytes().to_vec()
}

/// Create a ledger entry key from an entry ID.
#[must_use]
pub fn ledger_key(entry_id: &EntryId) -> Vec<u8> {
    entry_id.to_bytes().to_vec()
}

/// Create a user-ledger index key.
///
/// Format: `user_id (16 bytes) || entry_id (16 bytes)`
///
/// Since ULIDs are time-ordered, a user's entries sort chronologically.
#[must_use]
pub fn user_ledger_key(user_id: &UserId, entry_id: &EntryId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&entry_id.to_bytes());
    key
}

/// Create a prefix for iterating all ledger entries for a user.
#[must_use]
pub fn user_ledger_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the entry ID from a user-ledger index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_entry_id_from_user_key(key: &[u8]) -> EntryId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    EntryId::from_bytes(bytes).expect("valid ULID bytes")
}
