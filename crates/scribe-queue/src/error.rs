//! Error types for the Scribe broker.

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur in broker operations.
///
/// Storage-level faults surface as `Unavailable`: publishers fail closed
/// (no message written) and consumers back off and retry their scan loop.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The broker's backing store is unavailable or failed.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The queue was never declared.
    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    /// The queue name is not usable as a key prefix.
    #[error("invalid queue name: {0}")]
    InvalidQueueName(String),
}
