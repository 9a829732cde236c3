//! Generation job entity and its state machine.
//!
//! A [`Job`] is one user-submitted request to generate content. Its status
//! only ever moves forward: a terminal job (`Completed`, `DeadLettered`,
//! `Cancelled`) is never resurrected. Jobs are retained as an audit trail
//! and never deleted by the core pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::{ContentId, JobId, UserId};

/// Status of a generation job.
///
/// Legal transitions:
///
/// ```text
/// Queued -> Processing -> Completed
/// Queued -> Processing -> FailedRetry -> Processing (loop)
/// Queued | Processing | FailedRetry -> DeadLettered
/// Queued -> Cancelled
/// ```
///
/// `Queued -> DeadLettered` covers the submission rollback path: a job whose
/// queue publish failed is dead-lettered before the error is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted and published to the queue, not yet claimed by a worker.
    Queued,

    /// Claimed by a worker; generation is in flight.
    Processing,

    /// A retryable error occurred; the job is awaiting redelivery.
    FailedRetry,

    /// Generation succeeded and credits were settled.
    Completed,

    /// Retries exhausted or a permanent error occurred; reservation refunded.
    DeadLettered,

    /// Cancelled by the user while still queued; reservation refunded.
    Cancelled,
}

impl JobStatus {
    /// Check whether this status is terminal (no further transitions).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::DeadLettered | Self::Cancelled)
    }

    /// Check whether a job in this status may still be cancelled.
    ///
    /// Cancellation is authoritative only while the job is `Queued`; once a
    /// worker has claimed it, the job may finish anyway.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        matches!(self, Self::Queued)
    }

    /// Check whether a transition to `next` is legal.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Queued,
                Self::Processing | Self::Cancelled | Self::DeadLettered
            )
                | (
                    Self::Processing,
                    Self::Completed | Self::FailedRetry | Self::DeadLettered
                )
                | (Self::FailedRetry, Self::Processing | Self::DeadLettered)
        )
    }

    /// Get the status name as a string (for logs and index keys).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::FailedRetry => "failed_retry",
            Self::Completed => "completed",
            Self::DeadLettered => "dead_lettered",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Prompt parameters for a generation job.
///
/// The `params` payload is opaque to the pipeline; only the cost estimator
/// and the provider interpret it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptParams {
    /// Content type being generated (e.g. "blog_post", "product_description").
    pub content_type: String,

    /// AI provider name the job is routed to.
    pub provider: String,

    /// Model requested from the provider.
    pub model: String,

    /// Opaque structured prompt payload (topic, tone, keywords, ...).
    pub params: serde_json::Value,
}

/// A generation job tracked through its state machine.
///
/// Created by the orchestrator at submission time. Mutated only by the
/// worker (status, attempts, timestamps, error) and by the orchestrator
/// (cancellation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID.
    pub id: JobId,

    /// The user that submitted the job.
    pub user_id: UserId,

    /// The content item this job targets, if any.
    pub content_id: Option<ContentId>,

    /// Prompt parameters handed to the provider.
    pub prompt: PromptParams,

    /// Credits reserved up front, from the cost estimator.
    pub estimated_credits: i64,

    /// Credits actually consumed. Set if and only if the job completed.
    pub actual_credits_used: Option<i64>,

    /// Generated text, recorded on completion (and on a late completion
    /// after cancellation, where it is still surfaced to the user).
    pub output_text: Option<String>,

    /// Current status.
    pub status: JobStatus,

    /// Number of processing attempts started so far.
    pub attempts: u32,

    /// Most recent error message, if any attempt failed.
    pub last_error: Option<String>,

    /// When the job was created.
    pub created_at: DateTime<Utc>,

    /// When the most recent attempt started.
    pub processing_started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new queued job.
    #[must_use]
    pub fn new(
        user_id: UserId,
        content_id: Option<ContentId>,
        prompt: PromptParams,
        estimated_credits: i64,
    ) -> Self {
        Self {
            id: JobId::generate(),
            user_id,
            content_id,
            prompt,
            estimated_credits,
            actual_credits_used: None,
            output_text: None,
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            processing_started_at: None,
            completed_at: None,
        }
    }

    /// Transition into `Processing` for the given attempt number.
    ///
    /// Records the attempt start time and raises the attempt counter. The
    /// counter never moves backwards, so a redelivered old attempt cannot
    /// undo progress.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` if the job is not in a state
    /// from which processing may begin.
    pub fn begin_attempt(&mut self, attempt: u32) -> Result<()> {
        self.transition(JobStatus::Processing)?;
        self.attempts = self.attempts.max(attempt);
        self.processing_started_at = Some(Utc::now());
        Ok(())
    }

    /// Transition into `Completed`, recording the actual credit usage and
    /// the generated text.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` unless the job is `Processing`.
    pub fn complete(&mut self, actual_credits_used: i64, output_text: String) -> Result<()> {
        self.transition(JobStatus::Completed)?;
        self.actual_credits_used = Some(actual_credits_used);
        self.output_text = Some(output_text);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Transition into `FailedRetry`, recording the error.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` unless the job is `Processing`.
    pub fn fail_retryable(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::FailedRetry)?;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// Transition into `DeadLettered`, recording the final error.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` if the job is already terminal.
    pub fn dead_letter(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::DeadLettered)?;
        self.last_error = Some(error.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Transition into `Cancelled`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTransition` unless the job is `Queued`.
    pub fn cancel(&mut self) -> Result<()> {
        self.transition(JobStatus::Cancelled)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
