//! Wire envelope and dead-letter record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use ulid::Ulid;

/// The wire envelope carrying a message through the broker.
///
/// The envelope is owned by the broker while in flight; consumers borrow it
/// through a [`crate::Delivery`] for the duration of processing. The
/// `attempt` header is the broker-owned redelivery counter: it starts at 1
/// and is incremented on every requeue, so it survives process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Message ID (ULID; doubles as the time-ordered scan key component).
    pub id: Ulid,

    /// The queue this message belongs to.
    pub queue: String,

    /// Opaque message payload.
    pub payload: serde_json::Value,

    /// Delivery attempt this envelope represents, starting at 1.
    pub attempt: u32,

    /// Do not deliver before this instant (delayed redelivery).
    pub not_before: Option<DateTime<Utc>>,

    /// When the message was first published.
    pub enqueued_at: DateTime<Utc>,
}

impl Envelope {
    /// Check whether the message is ready for delivery at `now`.
    #[must_use]
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.not_before.map_or(true, |t| t <= now)
    }
}

/// Options for publishing a message.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    /// Delay before the message becomes deliverable.
    pub delay: Option<Duration>,
}

/// A message moved to a queue's dead-letter channel.
///
/// Created only by the broker when a delivery is negatively acknowledged
/// without requeue; never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    /// The original message ID.
    pub message_id: Ulid,

    /// The queue the message came from.
    pub queue: String,

    /// The original payload.
    pub payload: serde_json::Value,

    /// The final error that exhausted the message.
    pub error: String,

    /// Total delivery attempts made.
    pub attempts: u32,

    /// When the message was first published.
    pub enqueued_at: DateTime<Utc>,

    /// When the message was dead-lettered.
    pub dead_lettered_at: DateTime<Utc>,
}
