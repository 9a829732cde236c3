//! Key encoding for the broker's column families.
//!
//! Message keys are `queue_name || 0x00 || ulid (16 bytes)`; the NUL
//! separator keeps one queue's prefix from matching another queue whose
//! name merely starts with the same characters, and the ULID component
//! keeps a prefix scan in publish order.

use ulid::Ulid;

/// Create a message key for a queue.
#[must_use]
pub fn message_key(queue: &str, id: &Ulid) -> Vec<u8> {
    let mut key = Vec::with_capacity(queue.len() + 17);
    key.extend_from_slice(queue.as_bytes());
    key.push(0);
    key.extend_from_slice(&id.to_bytes());
    key
}

/// Create a prefix for iterating all messages in a queue.
#[must_use]
pub fn queue_prefix(queue: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(queue.len() + 1);
    prefix.extend_from_slice(queue.as_bytes());
    prefix.push(0);
    prefix
}
