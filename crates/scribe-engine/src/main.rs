//! Scribe Engine - generation job worker daemon.
//!
//! This is the main entry point for the engine. It opens the stores,
//! starts the configured number of workers, and runs until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scribe_engine::{EngineConfig, WorkerHandle, GENERATION_QUEUE};
use scribe_provider::{Generator, GeneratorOptions, HttpGenerator};
use scribe_queue::{Broker, ConsumeOptions};
use scribe_store::{RocksStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,scribe=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Scribe Engine");

    let config = EngineConfig::from_env();

    tracing::info!(
        data_dir = %config.data_dir,
        queue_dir = %config.queue_dir,
        provider = %config.provider_base_url,
        workers = config.workers,
        "Engine configuration loaded"
    );

    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store: Arc<dyn Store> = Arc::new(RocksStore::open(&config.data_dir)?);

    tracing::info!(path = %config.queue_dir, "Opening broker");
    let broker = Arc::new(Broker::open(&config.queue_dir)?);
    broker.declare_queue(GENERATION_QUEUE)?;

    let generator: Arc<dyn Generator> = Arc::new(HttpGenerator::with_options(
        &config.provider_base_url,
        &config.provider_api_key,
        GeneratorOptions {
            timeout_seconds: config.generation_timeout_seconds,
        },
    )?);

    let mut handles: Vec<WorkerHandle> = Vec::with_capacity(config.workers);
    for _ in 0..config.workers {
        let worker = scribe_engine::Worker::new(
            Arc::clone(&store),
            Arc::clone(&broker),
            Arc::clone(&generator),
            config.retry,
            Duration::from_secs(config.generation_timeout_seconds),
        );
        handles.push(worker.spawn(ConsumeOptions {
            prefetch: config.prefetch,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })?);
    }

    tracing::info!(workers = config.workers, "Workers running");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    futures::future::join_all(handles.into_iter().map(WorkerHandle::stop)).await;

    Ok(())
}
