//! Generation job engine for Scribe.
//!
//! Ties the pieces together: the orchestrator reserves credits and
//! publishes jobs, workers consume them, invoke the generation provider,
//! and settle credits against actual usage. Failed attempts retry with
//! bounded exponential backoff; exhausted jobs land on the dead-letter
//! channel with a full refund.
//!
//! Every component is explicitly constructed and dependency-injected with
//! a bounded lifecycle, so multiple engines can run side by side in one
//! test process and shut down deterministically.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod error;
mod message;
mod orchestrator;
mod worker;

pub use config::{EngineConfig, GENERATION_QUEUE};
pub use error::{EngineError, Result};
pub use message::JobMessage;
pub use orchestrator::{GenerationOrchestrator, JobPublisher};
pub use worker::{Worker, WorkerHandle};
