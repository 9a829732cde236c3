//! Generation provider integration for Scribe.
//!
//! This crate provides the seam between the engine and the external
//! generation capability:
//!
//! - [`Generator`]: the async trait the worker invokes, with an HTTP
//!   implementation ([`HttpGenerator`]) for real providers.
//! - [`CostEstimator`]: up-front credit estimation used at submission time,
//!   with a flat [`RateCard`] implementation keyed by content type and model.
//! - [`GenerationError`]: provider failures, each classifiable as transient
//!   or permanent for the retry policy via [`GenerationError::kind`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod estimator;

pub use client::{Generation, Generator, GeneratorOptions, HttpGenerator};
pub use error::{GenerationError, Result};
pub use estimator::{CostEstimator, RateCard, RateKey};
