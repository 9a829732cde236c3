//! Submission-side orchestration: reserve credits, create the job, publish.

use std::sync::Arc;

use scribe_core::{ContentId, Job, JobId, PromptParams, UserId};
use scribe_provider::CostEstimator;
use scribe_queue::{Broker, PublishOptions};
use scribe_store::{JobFilter, Store, StoreError};

use crate::config::GENERATION_QUEUE;
use crate::error::{EngineError, Result};
use crate::message::JobMessage;

/// Publishing side of the broker, as seen by the orchestrator.
///
/// A seam rather than the concrete `Broker` so submission failure handling
/// can be driven without a real storage fault.
pub trait JobPublisher: Send + Sync {
    /// Enqueue a job message on the generation queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be durably enqueued.
    fn publish_job(&self, message: &JobMessage) -> scribe_queue::Result<()>;
}

impl JobPublisher for Broker {
    fn publish_job(&self, message: &JobMessage) -> scribe_queue::Result<()> {
        self.publish(GENERATION_QUEUE, message, PublishOptions::default())?;
        Ok(())
    }
}

/// Front door for generation jobs.
///
/// Owns the submission path (estimate, reserve, publish) and the
/// user-facing queries (cancel, status, history). Explicitly constructed
/// with its collaborators so multiple instances can run in one test
/// process.
pub struct GenerationOrchestrator {
    store: Arc<dyn Store>,
    publisher: Arc<dyn JobPublisher>,
    estimator: Arc<dyn CostEstimator>,
}

impl GenerationOrchestrator {
    /// Create an orchestrator over a broker, declaring the generation queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be declared.
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<Broker>,
        estimator: Arc<dyn CostEstimator>,
    ) -> Result<Self> {
        broker.declare_queue(GENERATION_QUEUE)?;
        Ok(Self::with_publisher(store, broker, estimator))
    }

    /// Create an orchestrator over an arbitrary publisher.
    ///
    /// The caller is responsible for the queue existing on the other side.
    #[must_use]
    pub fn with_publisher(
        store: Arc<dyn Store>,
        publisher: Arc<dyn JobPublisher>,
        estimator: Arc<dyn CostEstimator>,
    ) -> Self {
        Self {
            store,
            publisher,
            estimator,
        }
    }

    /// Submit a generation job.
    ///
    /// Estimates the cost, then reserves credits and persists the `Queued`
    /// job in one atomic store write before publishing it to the generation
    /// queue. A publish failure refunds the reservation and dead-letters
    /// the job before the error is surfaced, so credits are never stranded.
    ///
    /// # Errors
    ///
    /// - `EngineError::InsufficientCredits` if the balance cannot cover the
    ///   estimate; nothing is created.
    /// - `EngineError::Broker` if the publish fails after rollback.
    pub fn submit(
        &self,
        user_id: UserId,
        content_id: Option<ContentId>,
        prompt: PromptParams,
    ) -> Result<JobId> {
        let estimated = self.estimator.estimate(&prompt);
        let job = Job::new(user_id, content_id, prompt, estimated);

        let reservation = self.store.reserve(&job)?;

        let message = JobMessage { job_id: job.id };
        if let Err(err) = self.publisher.publish_job(&message) {
            tracing::error!(job_id = %job.id, error = %err, "publish failed, rolling back submission");
            if let Err(refund_err) = self.store.refund_full(&reservation.id, "publish failed") {
                tracing::error!(job_id = %job.id, error = %refund_err, "rollback refund failed");
            }
            if let Err(dl_err) = self
                .store
                .dead_letter_job(&job.id, &format!("publish failed: {err}"))
            {
                tracing::error!(job_id = %job.id, error = %dl_err, "rollback dead-letter failed");
            }
            return Err(err.into());
        }

        tracing::info!(
            job_id = %job.id,
            user_id = %user_id,
            estimated_credits = estimated,
            "job submitted"
        );
        Ok(job.id)
    }

    /// Cancel a queued job and refund its reservation in full.
    ///
    /// Authoritative only while the job is still `Queued`; the message is
    /// not removed from the queue, instead the worker drops the delivery as
    /// a no-op when it sees the terminal status.
    ///
    /// # Errors
    ///
    /// - `EngineError::JobNotFound` if the job doesn't exist.
    /// - `EngineError::NotCancellable` if the job is past `Queued`.
    pub fn cancel(&self, job_id: &JobId) -> Result<Job> {
        let job = match self.store.cancel_job(job_id) {
            Ok(job) => job,
            Err(StoreError::NotFound) => return Err(EngineError::JobNotFound(*job_id)),
            Err(err) => return Err(err.into()),
        };

        match self.store.reservation_for_job(job_id)? {
            Some(reservation) => match self.store.refund_full(&reservation.id, "job cancelled") {
                Ok(amount) => {
                    tracing::info!(job_id = %job_id, refunded = amount, "cancelled job refunded");
                }
                Err(StoreError::AlreadySettled { .. }) => {
                    tracing::warn!(job_id = %job_id, "reservation already released on cancel");
                }
                Err(err) => return Err(err.into()),
            },
            None => {
                tracing::error!(job_id = %job_id, "cancelled job has no reservation");
            }
        }

        Ok(job)
    }

    /// Get the current snapshot of a job. Never blocks on processing.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::JobNotFound` if the job doesn't exist.
    pub fn status(&self, job_id: &JobId) -> Result<Job> {
        self.store
            .get_job(job_id)?
            .ok_or(EngineError::JobNotFound(*job_id))
    }

    /// List a user's jobs, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub fn history(
        &self,
        user_id: &UserId,
        filter: &JobFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Job>> {
        Ok(self.store.list_jobs_by_user(user_id, filter, limit, offset)?)
    }

    /// Get a user's current spendable balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the account doesn't exist or storage fails.
    pub fn balance(&self, user_id: &UserId) -> Result<i64> {
        Ok(self.store.balance(user_id)?)
    }
}
