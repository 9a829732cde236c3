//! Cost estimation for generation jobs.
//!
//! Estimation runs before any credits are reserved, so it only sees the
//! prompt parameters, never the actual usage. The worker later settles the
//! reservation against what the provider actually consumed.

use std::collections::HashMap;

use scribe_core::PromptParams;
use serde::{Deserialize, Serialize};

/// Estimates the credit cost of a generation job from its prompt parameters.
pub trait CostEstimator: Send + Sync {
    /// Estimate the credits a job will consume.
    fn estimate(&self, prompt: &PromptParams) -> i64;
}

/// Key for looking up a generation rate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateKey {
    /// Content type (e.g., "article", "summary").
    pub content_type: String,
    /// Model name (e.g., "claude-3-5-sonnet", "gpt-4o").
    pub model: String,
}

impl RateKey {
    /// Create a new rate key.
    #[must_use]
    pub fn new(content_type: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            model: model.into(),
        }
    }
}

/// Flat per-job rate card, keyed by content type and model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateCard {
    /// Estimated credits per job by content type and model.
    pub rates: HashMap<RateKey, i64>,

    /// Estimate for unknown content type/model combinations.
    pub default_credits: i64,
}

impl Default for RateCard {
    fn default() -> Self {
        let mut rates = HashMap::new();

        rates.insert(RateKey::new("article", "claude-3-5-sonnet"), 300);
        rates.insert(RateKey::new("article", "gpt-4o"), 250);
        rates.insert(RateKey::new("summary", "claude-3-5-sonnet"), 50);
        rates.insert(RateKey::new("summary", "gpt-4o-mini"), 10);
        rates.insert(RateKey::new("social-post", "claude-3-haiku"), 15);
        rates.insert(RateKey::new("social-post", "gpt-4o-mini"), 10);

        Self {
            rates,
            default_credits: 100,
        }
    }
}

impl RateCard {
    /// Override the rate for one content type/model pair.
    #[must_use]
    pub fn with_rate(
        mut self,
        content_type: impl Into<String>,
        model: impl Into<String>,
        credits: i64,
    ) -> Self {
        self.rates
            .insert(RateKey::new(content_type, model), credits);
        self
    }
}

impl CostEstimator for RateCard {
    fn estimate(&self, prompt: &PromptParams) -> i64 {
        let key = RateKey::new(prompt.content_type.clone(), prompt.model.clone());
        self.rates
            .get(&key)
            .copied()
            .unwrap_or(self.default_credits)
    }
}
