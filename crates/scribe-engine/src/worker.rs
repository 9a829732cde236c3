//! The worker loop: consume, generate, settle.
//!
//! A worker never crashes the process on a single job's failure; every
//! error in this module is recovered locally and recorded on the job. All
//! store writes are idempotent keyed by `(job_id, attempt)`, so a
//! redelivered message after a crash cannot double-settle credits or
//! resurrect a terminal job.

use std::sync::Arc;
use std::time::Duration;

use scribe_core::{Job, JobId, RetryDecision, RetryPolicy};
use scribe_provider::{Generation, GenerationError, Generator};
use scribe_queue::{Broker, ConsumeOptions, Delivery};
use scribe_store::{ClaimOutcome, Store, StoreError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::GENERATION_QUEUE;
use crate::error::Result;
use crate::message::JobMessage;

/// How a delivery should be settled once processing ends.
enum Settle {
    Ack,
    Retry(Duration),
    DeadLetter(String),
}

/// A generation worker.
///
/// Consumes the generation queue with bounded prefetch, invokes the
/// generator with a timeout, and applies the retry policy on failure.
pub struct Worker {
    store: Arc<dyn Store>,
    broker: Arc<Broker>,
    generator: Arc<dyn Generator>,
    retry: RetryPolicy,
    generation_timeout: Duration,
}

impl Worker {
    /// Create a new worker.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<Broker>,
        generator: Arc<dyn Generator>,
        retry: RetryPolicy,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            broker,
            generator,
            retry,
            generation_timeout,
        }
    }

    /// Start the worker loop on the generation queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer cannot be started.
    pub fn spawn(self, options: ConsumeOptions) -> Result<WorkerHandle> {
        let mut consumer = self.broker.consume(GENERATION_QUEUE, options)?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    delivery = consumer.recv() => match delivery {
                        Some(delivery) => self.handle_delivery(delivery).await,
                        None => break,
                    },
                    _ = shutdown_rx.changed() => break,
                }
            }
            consumer.stop().await;
        });

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            task,
        })
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let message: JobMessage = match delivery.payload() {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(error = %err, "undecodable message payload, dead-lettering");
                if let Err(settle_err) =
                    delivery.nack_dead_letter(&format!("undecodable payload: {err}"))
                {
                    tracing::error!(error = %settle_err, "failed to dead-letter message");
                }
                return;
            }
        };

        let attempt = delivery.attempt();
        let settled = match self.process(message.job_id, attempt).await {
            Settle::Ack => delivery.ack(),
            Settle::Retry(delay) => delivery.nack_requeue(Some(delay)).map(|_| ()),
            Settle::DeadLetter(error) => delivery.nack_dead_letter(&error),
        };

        if let Err(err) = settled {
            // The unsettled delivery returns to the ready set on drop.
            tracing::error!(job_id = %message.job_id, error = %err, "failed to settle delivery");
        }
    }

    async fn process(&self, job_id: JobId, attempt: u32) -> Settle {
        let job = match self.store.begin_attempt(&job_id, attempt) {
            Ok(ClaimOutcome::Claimed(job)) => job,
            Ok(ClaimOutcome::Superseded(status)) => {
                tracing::debug!(
                    job_id = %job_id,
                    status = status.as_str(),
                    "delivery superseded by terminal job, dropping"
                );
                return Settle::Ack;
            }
            Err(StoreError::NotFound) => {
                tracing::warn!(job_id = %job_id, "message references unknown job, dropping");
                return Settle::Ack;
            }
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "failed to claim job, backing off");
                return Settle::Retry(self.retry.base_delay);
            }
        };

        tracing::info!(
            job_id = %job_id,
            attempt,
            model = %job.prompt.model,
            "processing generation job"
        );

        let outcome = tokio::time::timeout(
            self.generation_timeout,
            self.generator.generate(&job.prompt),
        )
        .await;

        let err = match outcome {
            Ok(Ok(generation)) => return self.finish(&job, &generation),
            Ok(Err(err)) => err,
            Err(_) => GenerationError::Timeout {
                seconds: self.generation_timeout.as_secs(),
            },
        };

        self.handle_failure(&job, attempt, &err)
    }

    /// Success path: settle credits against actual usage, complete the job.
    fn finish(&self, job: &Job, generation: &Generation) -> Settle {
        let actual = generation.units_consumed;

        match self.store.reservation_for_job(&job.id) {
            Ok(Some(reservation)) => match self.store.settle(&reservation.id, actual) {
                Ok(refunded) => {
                    tracing::info!(
                        job_id = %job.id,
                        actual_credits = actual,
                        refunded,
                        "credits settled"
                    );
                }
                Err(StoreError::AlreadySettled { .. }) => {
                    // Benign conflict: the job was cancelled mid-flight or a
                    // duplicate delivery settled first.
                    tracing::warn!(job_id = %job.id, "reservation already released, skipping settle");
                }
                Err(err) => {
                    tracing::error!(job_id = %job.id, error = %err, "settle failed, backing off");
                    return Settle::Retry(self.retry.base_delay);
                }
            },
            Ok(None) => {
                tracing::error!(job_id = %job.id, "job has no reservation");
            }
            Err(err) => {
                tracing::error!(job_id = %job.id, error = %err, "reservation lookup failed, backing off");
                return Settle::Retry(self.retry.base_delay);
            }
        }

        match self.store.complete_job(&job.id, actual, &generation.text) {
            Ok(_) => {
                tracing::info!(job_id = %job.id, "job completed");
                Settle::Ack
            }
            Err(StoreError::InvalidTransition(_)) => {
                // Late completion after cancellation: keep the text for the
                // user, leave the terminal status alone.
                if let Err(err) = self.store.record_late_output(&job.id, &generation.text) {
                    tracing::error!(job_id = %job.id, error = %err, "failed to record late output");
                }
                tracing::warn!(job_id = %job.id, "job finished after reaching a terminal state");
                Settle::Ack
            }
            Err(err) => {
                tracing::error!(job_id = %job.id, error = %err, "completion write failed, backing off");
                Settle::Retry(self.retry.base_delay)
            }
        }
    }

    /// Failure path: consult the retry policy, record the outcome.
    fn handle_failure(&self, job: &Job, attempt: u32, err: &GenerationError) -> Settle {
        let error_text = err.to_string();

        match self.retry.decide(attempt, err.kind()) {
            RetryDecision::Retry(delay) => {
                tracing::warn!(
                    job_id = %job.id,
                    attempt,
                    delay = ?delay,
                    error = %error_text,
                    "generation failed, retrying"
                );
                if let Err(store_err) = self.store.record_retry(&job.id, &error_text) {
                    tracing::error!(job_id = %job.id, error = %store_err, "failed to record retry");
                }
                Settle::Retry(delay)
            }
            RetryDecision::DeadLetter => {
                tracing::warn!(
                    job_id = %job.id,
                    attempt,
                    error = %error_text,
                    "generation exhausted, dead-lettering"
                );
                if let Err(store_err) = self.store.dead_letter_job(&job.id, &error_text) {
                    tracing::error!(job_id = %job.id, error = %store_err, "failed to dead-letter job");
                }
                self.refund_in_full(&job.id);
                Settle::DeadLetter(error_text)
            }
        }
    }

    fn refund_in_full(&self, job_id: &JobId) {
        match self.store.reservation_for_job(job_id) {
            Ok(Some(reservation)) => {
                match self.store.refund_full(&reservation.id, "job dead-lettered") {
                    Ok(amount) => {
                        tracing::info!(job_id = %job_id, refunded = amount, "reservation refunded in full");
                    }
                    Err(StoreError::AlreadySettled { .. }) => {
                        tracing::warn!(job_id = %job_id, "reservation already released");
                    }
                    Err(err) => {
                        tracing::error!(job_id = %job_id, error = %err, "refund failed");
                    }
                }
            }
            Ok(None) => {
                tracing::error!(job_id = %job_id, "job has no reservation");
            }
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "reservation lookup failed");
            }
        }
    }
}

/// Handle for a running worker.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Stop the worker and wait for its loop to exit.
    ///
    /// In-flight deliveries that were not settled return to the queue.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
