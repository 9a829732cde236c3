//! Core types for the Scribe generation platform.
//!
//! This crate provides the foundational types used throughout the
//! generation-job pipeline:
//!
//! - **Identifiers**: `UserId`, `JobId`, `ContentId`, `ReservationId`, `EntryId`
//! - **Accounts**: `Account`
//! - **Jobs**: `Job`, `JobStatus`, `PromptParams` and the job state machine
//! - **Credits**: `CreditReservation`, `LedgerEntry`, `EntryKind`
//! - **Retry**: `RetryPolicy`, `RetryDecision`, `ErrorKind`
//!
//! # Credit Unit
//!
//! Credits are integer units (`i64`), never floats, so balances stay exact
//! across reserve/settle/refund cycles. One generation job holds exactly one
//! reservation, released exactly once.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod error;
pub mod ids;
pub mod job;
pub mod reservation;
pub mod retry;

pub use account::Account;
pub use error::{CoreError, Result};
pub use ids::{ContentId, EntryId, IdError, JobId, ReservationId, UserId};
pub use job::{Job, JobStatus, PromptParams};
pub use reservation::{CreditReservation, EntryKind, LedgerEntry, ReservationStatus};
pub use retry::{
    ErrorKind, RetryDecision, RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY,
};
