//! Durable, at-least-once message broker for the Scribe engine.
//!
//! The broker persists messages in `RocksDB` so that anything published
//! survives a process restart. Delivery is at-least-once: a consumer that
//! crashes (or drops a delivery) before settling it sees the same message
//! again, so consumers must make their processing idempotent.
//!
//! Each declared queue has a companion dead-letter channel (`<name>.dlq`)
//! holding messages that were negatively acknowledged without requeue,
//! together with the final error. Nothing is silently dropped.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod broker;
mod envelope;
mod error;
mod keys;

pub use broker::{Broker, ConsumeOptions, Consumer, Delivery, DLQ_SUFFIX};
pub use envelope::{DeadLetterRecord, Envelope, PublishOptions};
pub use error::{QueueError, Result};
