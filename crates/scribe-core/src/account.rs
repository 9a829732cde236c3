//! Credit account for a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A credit account for a user.
///
/// `balance` is the spendable amount: reserving credits for a job moves them
/// out of the balance immediately, so a concurrent reservation can never
/// observe credits that are already held.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// The user this account belongs to.
    pub user_id: UserId,

    /// Spendable credit balance.
    pub balance: i64,

    /// Lifetime credits granted to the account.
    pub lifetime_granted: i64,

    /// Lifetime credits actually consumed by completed jobs.
    pub lifetime_used: i64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: 0,
            lifetime_granted: 0,
            lifetime_used: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account can cover a reservation of `amount` credits.
    #[must_use]
    pub fn has_sufficient_credits(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}
