//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Credit accounts, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Generation jobs, keyed by `job_id`.
    pub const JOBS: &str = "jobs";

    /// Index: jobs by user, keyed by `user_id || created_at_millis || job_id`.
    /// Value is empty (index only).
    pub const JOBS_BY_USER: &str = "jobs_by_user";

    /// Credit reservations, keyed by `reservation_id` (ULID).
    pub const RESERVATIONS: &str = "reservations";

    /// Index: reservation by job, keyed by `job_id`. Value is the
    /// 16-byte reservation ID.
    pub const RESERVATIONS_BY_JOB: &str = "reservations_by_job";

    /// Ledger entries, keyed by `entry_id` (ULID).
    pub const LEDGER: &str = "ledger";

    /// Index: ledger entries by user, keyed by `user_id || entry_id`.
    /// Value is empty (index only).
    pub const LEDGER_BY_USER: &str = "ledger_by_user";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::JOBS,
        cf::JOBS_BY_USER,
        cf::RESERVATIONS,
        cf::RESERVATIONS_BY_JOB,
        cf::LEDGER,
        cf::LEDGER_BY_USER,
    ]
}
