//! Generation provider client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scribe_core::PromptParams;
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, Result};

/// A completed generation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    /// The generated text.
    pub text: String,

    /// The model that actually served the request.
    pub model_used: String,

    /// Billable units consumed (tokens or words, per the provider).
    pub units_consumed: i64,
}

/// A generation capability the worker can invoke.
///
/// Implementations must be safe to call concurrently; the worker shares one
/// generator across all in-flight jobs.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate content for the given prompt parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationError`]; its [`GenerationError::kind`]
    /// classification drives the retry policy.
    async fn generate(&self, prompt: &PromptParams) -> Result<Generation>;
}

/// HTTP generation provider client.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: Client,
    base_url: String,
    api_key: String,
}

/// Options for customizing the HTTP generator.
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Request timeout in seconds (default: 120).
    pub timeout_seconds: u64,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    content_type: &'a str,
    params: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
    model: String,
    units_consumed: i64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[allow(dead_code)]
    code: String,
    message: String,
}

impl HttpGenerator {
    /// Create a new generator client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_options(base_url, api_key, GeneratorOptions::default())
    }

    /// Create a new generator client with custom options.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: GeneratorOptions,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn handle_error(response: reqwest::Response) -> GenerationError {
        let status = response.status();
        let message = match response.json::<ApiErrorResponse>().await {
            Ok(body) => body.error.message,
            Err(_) => format!("HTTP {status}"),
        };

        match status.as_u16() {
            429 => GenerationError::RateLimited { message },
            400 | 422 => GenerationError::InvalidPrompt(message),
            code => GenerationError::Provider {
                status: code,
                message,
            },
        }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &PromptParams) -> Result<Generation> {
        let url = format!("{}/v1/generate", self.base_url);
        let request = GenerateRequest {
            model: &prompt.model,
            content_type: &prompt.content_type,
            params: &prompt.params,
        };

        tracing::debug!(model = %prompt.model, content_type = %prompt.content_type, "calling generation provider");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        Ok(Generation {
            text: body.text,
            model_used: body.model,
            units_consumed: body.units_consumed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::ErrorKind;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_prompt() -> PromptParams {
        PromptParams {
            content_type: "article".to_string(),
            provider: "anthropic".to_string(),
            model: "claude-3-5-sonnet".to_string(),
            params: serde_json::json!({ "topic": "rust", "length": 800 }),
        }
    }

    #[tokio::test]
    async fn successful_generation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "Rust is a systems language.",
                "model": "claude-3-5-sonnet",
                "units_consumed": 250
            })))
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(server.uri(), "test-key").unwrap();
        let generation = generator.generate(&test_prompt()).await.unwrap();

        assert_eq!(generation.text, "Rust is a systems language.");
        assert_eq!(generation.model_used, "claude-3-5-sonnet");
        assert_eq!(generation.units_consumed, 250);
    }

    #[tokio::test]
    async fn rate_limit_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "code": "rate_limited", "message": "too many requests" }
            })))
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(server.uri(), "test-key").unwrap();
        let err = generator.generate(&test_prompt()).await.unwrap_err();

        assert!(matches!(err, GenerationError::RateLimited { .. }));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn invalid_prompt_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "error": { "code": "invalid_prompt", "message": "prompt is empty" }
            })))
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(server.uri(), "test-key").unwrap();
        let err = generator.generate(&test_prompt()).await.unwrap_err();

        assert!(matches!(err, GenerationError::InvalidPrompt(_)));
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(server.uri(), "test-key").unwrap();
        let err = generator.generate(&test_prompt()).await.unwrap_err();

        assert!(matches!(err, GenerationError::Provider { status: 503, .. }));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[tokio::test]
    async fn malformed_body_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let generator = HttpGenerator::new(server.uri(), "test-key").unwrap();
        let err = generator.generate(&test_prompt()).await.unwrap_err();

        assert!(matches!(err, GenerationError::MalformedResponse(_)));
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }
}
