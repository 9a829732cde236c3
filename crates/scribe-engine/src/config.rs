//! Engine configuration.

use scribe_core::RetryPolicy;

/// The queue carrying generation jobs.
///
/// Queue names are fixed strings; future queue types follow the same
/// `<name>` + `<name>.dlq` pattern.
pub const GENERATION_QUEUE: &str = "content-generation";

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the `RocksDB` job/credit store (default: "/data/scribe/jobs").
    pub data_dir: String,

    /// Path to the `RocksDB` broker database (default: "/data/scribe/queue").
    pub queue_dir: String,

    /// Base URL of the generation provider.
    pub provider_base_url: String,

    /// API key for the generation provider.
    pub provider_api_key: String,

    /// Number of worker tasks to run (default: 2).
    pub workers: usize,

    /// Per-worker bound on in-flight deliveries (default: 4).
    pub prefetch: usize,

    /// Broker poll interval in milliseconds (default: 250).
    pub poll_interval_ms: u64,

    /// Timeout for a single generation call in seconds (default: 120).
    pub generation_timeout_seconds: u64,

    /// Retry policy for failed generation attempts.
    pub retry: RetryPolicy,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/scribe/jobs".into()),
            queue_dir: std::env::var("QUEUE_DIR").unwrap_or_else(|_| "/data/scribe/queue".into()),
            provider_base_url: std::env::var("PROVIDER_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8090".into()),
            provider_api_key: std::env::var("PROVIDER_API_KEY").unwrap_or_default(),
            workers: std::env::var("WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            prefetch: std::env::var("PREFETCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            poll_interval_ms: std::env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(250),
            generation_timeout_seconds: std::env::var("GENERATION_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(120),
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: "/data/scribe/jobs".into(),
            queue_dir: "/data/scribe/queue".into(),
            provider_base_url: "http://localhost:8090".into(),
            provider_api_key: String::new(),
            workers: 2,
            prefetch: 4,
            poll_interval_ms: 250,
            generation_timeout_seconds: 120,
            retry: RetryPolicy::default(),
        }
    }
}
