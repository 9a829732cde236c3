//! End-to-end scenarios: submit, process, retry, cancel, dead-letter.

mod common;

use std::sync::Arc;

use common::{article_prompt, Script, ScriptedGenerator, TestHarness};
use scribe_core::{JobStatus, ReservationStatus, UserId};
use scribe_engine::{
    EngineError, GenerationOrchestrator, JobMessage, JobPublisher, GENERATION_QUEUE,
};
use scribe_provider::RateCard;
use scribe_queue::{PublishOptions, QueueError};
use scribe_store::{JobFilter, Store};

#[tokio::test]
async fn successful_job_settles_actual_usage() {
    let harness = TestHarness::new();
    let user = UserId::generate();
    harness.grant(&user, 1000);

    let job_id = harness
        .orchestrator
        .submit(user, None, article_prompt())
        .unwrap();

    // Estimate (300) is held immediately, before any processing.
    assert_eq!(harness.orchestrator.balance(&user).unwrap(), 700);

    let generator = ScriptedGenerator::new(vec![Script::Succeed {
        units: 250,
        text: "Credit ledgers, explained.",
    }]);
    let worker = harness.spawn_worker(generator.clone());

    let job = harness
        .wait_for_status(&job_id, JobStatus::Completed)
        .await;

    assert_eq!(job.actual_credits_used, Some(250));
    assert_eq!(job.output_text.as_deref(), Some("Credit ledgers, explained."));
    assert_eq!(job.attempts, 1);

    // Only actual usage is deducted; the 50-credit difference came back.
    assert_eq!(harness.orchestrator.balance(&user).unwrap(), 750);
    assert_eq!(generator.calls(), 1);

    worker.stop().await;
}

#[tokio::test]
async fn exhausted_retries_dead_letter_and_refund() {
    let harness = TestHarness::new();
    let user = UserId::generate();
    harness.grant(&user, 1000);

    let job_id = harness
        .orchestrator
        .submit(user, None, article_prompt())
        .unwrap();
    assert_eq!(harness.orchestrator.balance(&user).unwrap(), 700);

    let generator = ScriptedGenerator::new(vec![
        Script::FailTransient("provider rate limited"),
        Script::FailTransient("provider rate limited"),
        Script::FailTransient("provider rate limited"),
    ]);
    let worker = harness.spawn_worker(generator.clone());

    let job = harness
        .wait_for_status(&job_id, JobStatus::DeadLettered)
        .await;

    assert_eq!(job.attempts, 3);
    assert!(job.last_error.as_deref().unwrap().contains("rate limited"));
    assert_eq!(generator.calls(), 3);

    // Full refund: net zero credit effect.
    assert_eq!(harness.orchestrator.balance(&user).unwrap(), 1000);

    let records = harness.broker.dead_letters(GENERATION_QUEUE, 10).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].attempts, 3);

    worker.stop().await;
}

#[tokio::test]
async fn permanent_error_dead_letters_on_first_attempt() {
    let harness = TestHarness::new();
    let user = UserId::generate();
    harness.grant(&user, 500);

    let job_id = harness
        .orchestrator
        .submit(user, None, article_prompt())
        .unwrap();

    let generator = ScriptedGenerator::new(vec![Script::FailPermanent("prompt is empty")]);
    let worker = harness.spawn_worker(generator.clone());

    let job = harness
        .wait_for_status(&job_id, JobStatus::DeadLettered)
        .await;

    assert_eq!(job.attempts, 1);
    assert_eq!(generator.calls(), 1);
    assert_eq!(harness.orchestrator.balance(&user).unwrap(), 500);

    worker.stop().await;
}

#[tokio::test]
async fn cancel_while_queued_refunds_and_skips_processing() {
    let harness = TestHarness::new();
    let user = UserId::generate();
    harness.grant(&user, 1000);

    // No worker running yet, so the job stays queued.
    let job_id = harness
        .orchestrator
        .submit(user, None, article_prompt())
        .unwrap();
    assert_eq!(harness.orchestrator.balance(&user).unwrap(), 700);

    let job = harness.orchestrator.cancel(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(harness.orchestrator.balance(&user).unwrap(), 1000);

    // The message is still in the queue; delivering it must be a no-op.
    let generator = ScriptedGenerator::new(vec![]);
    let worker = harness.spawn_worker(generator.clone());
    harness.wait_for_drain().await;

    assert_eq!(generator.calls(), 0);
    assert_eq!(harness.orchestrator.balance(&user).unwrap(), 1000);
    let job = harness.orchestrator.status(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);

    worker.stop().await;
}

#[tokio::test]
async fn insufficient_credits_leaves_no_orphans() {
    let harness = TestHarness::new();
    let user = UserId::generate();
    harness.grant(&user, 100);

    let err = harness
        .orchestrator
        .submit(user, None, article_prompt())
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientCredits {
            balance: 100,
            required: 300
        }
    ));

    // No job, no reservation, no queue message.
    assert!(harness
        .orchestrator
        .history(&user, &JobFilter::default(), 10, 0)
        .unwrap()
        .is_empty());
    let entries = harness.store.list_ledger_entries(&user, 10, 0).unwrap();
    assert_eq!(entries.len(), 1, "only the grant should be on the ledger");
    assert_eq!(harness.broker.queue_depth(GENERATION_QUEUE).unwrap(), 0);
    assert_eq!(harness.orchestrator.balance(&user).unwrap(), 100);
}

struct OfflinePublisher;

impl JobPublisher for OfflinePublisher {
    fn publish_job(&self, _message: &JobMessage) -> scribe_queue::Result<()> {
        Err(QueueError::Unavailable("broker offline".to_string()))
    }
}

#[tokio::test]
async fn publish_failure_refunds_and_dead_letters() {
    let harness = TestHarness::new();
    let user = UserId::generate();
    harness.grant(&user, 1000);

    let orchestrator = GenerationOrchestrator::with_publisher(
        Arc::clone(&harness.store) as Arc<dyn Store>,
        Arc::new(OfflinePublisher),
        Arc::new(RateCard::default()),
    );

    let err = orchestrator
        .submit(user, None, article_prompt())
        .unwrap_err();
    assert!(matches!(err, EngineError::Broker(_)));

    // The hold was rolled back in full and the job is parked, not lost.
    assert_eq!(harness.orchestrator.balance(&user).unwrap(), 1000);
    let jobs = harness
        .orchestrator
        .history(&user, &JobFilter::default(), 10, 0)
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::DeadLettered);

    let reservation = harness
        .store
        .reservation_for_job(&jobs[0].id)
        .unwrap()
        .unwrap();
    assert_eq!(reservation.status, ReservationStatus::Refunded);
}

#[tokio::test]
async fn duplicate_delivery_after_completion_is_noop() {
    let harness = TestHarness::new();
    let user = UserId::generate();
    harness.grant(&user, 1000);

    let job_id = harness
        .orchestrator
        .submit(user, None, article_prompt())
        .unwrap();

    let generator = ScriptedGenerator::new(vec![Script::Succeed {
        units: 200,
        text: "done",
    }]);
    let worker = harness.spawn_worker(generator.clone());
    harness
        .wait_for_status(&job_id, JobStatus::Completed)
        .await;
    assert_eq!(harness.orchestrator.balance(&user).unwrap(), 800);

    // Simulate a redelivery of the same job.
    harness
        .broker
        .publish(GENERATION_QUEUE, &JobMessage { job_id }, PublishOptions::default())
        .unwrap();
    harness.wait_for_drain().await;

    // One generation, one settle; the duplicate was dropped.
    assert_eq!(generator.calls(), 1);
    assert_eq!(harness.orchestrator.balance(&user).unwrap(), 800);

    worker.stop().await;
}

#[tokio::test]
async fn cancel_after_completion_is_rejected() {
    let harness = TestHarness::new();
    let user = UserId::generate();
    harness.grant(&user, 1000);

    let job_id = harness
        .orchestrator
        .submit(user, None, article_prompt())
        .unwrap();

    let generator = ScriptedGenerator::new(vec![Script::Succeed {
        units: 300,
        text: "done",
    }]);
    let worker = harness.spawn_worker(generator);
    harness
        .wait_for_status(&job_id, JobStatus::Completed)
        .await;

    let err = harness.orchestrator.cancel(&job_id).unwrap_err();
    assert!(matches!(
        err,
        EngineError::NotCancellable {
            status: JobStatus::Completed,
            ..
        }
    ));

    worker.stop().await;
}

#[tokio::test]
async fn history_filters_by_status() {
    let harness = TestHarness::new();
    let user = UserId::generate();
    harness.grant(&user, 1000);

    let first = harness
        .orchestrator
        .submit(user, None, article_prompt())
        .unwrap();
    let second = harness
        .orchestrator
        .submit(user, None, article_prompt())
        .unwrap();
    harness.orchestrator.cancel(&second).unwrap();

    let all = harness
        .orchestrator
        .history(&user, &JobFilter::default(), 10, 0)
        .unwrap();
    assert_eq!(all.len(), 2);

    let cancelled = harness
        .orchestrator
        .history(
            &user,
            &JobFilter {
                status: Some(JobStatus::Cancelled),
            },
            10,
            0,
        )
        .unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, second);

    let queued = harness
        .orchestrator
        .history(
            &user,
            &JobFilter {
                status: Some(JobStatus::Queued),
            },
            10,
            0,
        )
        .unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id, first);
}
