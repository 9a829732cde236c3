//! Shared harness for engine integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scribe_core::{Job, JobId, JobStatus, PromptParams, RetryPolicy, UserId};
use scribe_engine::{GenerationOrchestrator, Worker, WorkerHandle, GENERATION_QUEUE};
use scribe_provider::{Generation, GenerationError, Generator, RateCard};
use scribe_queue::{Broker, ConsumeOptions};
use scribe_store::{RocksStore, Store};
use tempfile::TempDir;

/// One scripted generator response.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Succeed {
        units: i64,
        text: &'static str,
    },
    FailTransient(&'static str),
    FailPermanent(&'static str),
}

/// Generator that replays a fixed script of responses.
///
/// Panics if invoked more times than scripted, which doubles as a no-op
/// assertion for deliveries that should be dropped.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Script>>,
    calls: AtomicU32,
}

impl ScriptedGenerator {
    pub fn new(steps: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, _prompt: &PromptParams) -> scribe_provider::Result<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .expect("generator invoked more times than scripted");

        match step {
            Script::Succeed { units, text } => Ok(Generation {
                text: text.to_string(),
                model_used: "test-model".to_string(),
                units_consumed: units,
            }),
            Script::FailTransient(message) => Err(GenerationError::RateLimited {
                message: message.to_string(),
            }),
            Script::FailPermanent(message) => {
                Err(GenerationError::InvalidPrompt(message.to_string()))
            }
        }
    }
}

pub struct TestHarness {
    pub store: Arc<RocksStore>,
    pub broker: Arc<Broker>,
    pub orchestrator: GenerationOrchestrator,
    _data_dir: TempDir,
    _queue_dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let data_dir = TempDir::new().unwrap();
        let queue_dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(data_dir.path()).unwrap());
        let broker = Arc::new(Broker::open(queue_dir.path()).unwrap());
        let orchestrator = GenerationOrchestrator::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&broker),
            Arc::new(RateCard::default()),
        )
        .unwrap();

        Self {
            store,
            broker,
            orchestrator,
            _data_dir: data_dir,
            _queue_dir: queue_dir,
        }
    }

    pub fn grant(&self, user_id: &UserId, amount: i64) {
        self.store
            .grant_credits(user_id, amount, "test grant")
            .unwrap();
    }

    pub fn spawn_worker(&self, generator: Arc<ScriptedGenerator>) -> WorkerHandle {
        let worker = Worker::new(
            Arc::clone(&self.store) as Arc<dyn Store>,
            Arc::clone(&self.broker),
            generator as Arc<dyn Generator>,
            test_retry(),
            Duration::from_secs(5),
        );
        worker
            .spawn(ConsumeOptions {
                prefetch: 4,
                poll_interval: Duration::from_millis(10),
            })
            .unwrap()
    }

    /// Poll until the job reaches the given status, or panic after 5s.
    pub async fn wait_for_status(&self, job_id: &JobId, status: JobStatus) -> Job {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let job = self.orchestrator.status(job_id).unwrap();
            if job.status == status {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {job_id} stuck in {:?}, wanted {status:?}",
                job.status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until the generation queue is drained, or panic after 5s.
    pub async fn wait_for_drain(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if self.broker.queue_depth(GENERATION_QUEUE).unwrap() == 0 {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "generation queue did not drain"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Fast backoff so retry tests finish quickly.
pub fn test_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
    }
}

/// An article prompt estimated at 300 credits by the default rate card.
pub fn article_prompt() -> PromptParams {
    PromptParams {
        content_type: "article".to_string(),
        provider: "anthropic".to_string(),
        model: "claude-3-5-sonnet".to_string(),
        params: serde_json::json!({ "topic": "credit ledgers", "length": 800 }),
    }
}
