//! OpenAI-compatible embedding and classification backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument};

use livlib_core::models::truncate_chars;
use livlib_core::{
    defaults, Classification, ContentClassifier, EmbeddingBackend, Error, Result, Vector,
};

use super::error::{from_transport, to_livlib_error, OpenAIErrorCode};
use super::types::*;
use crate::classify::{parse_classification, CLASSIFY_SYSTEM_PROMPT};

/// Default OpenAI API endpoint.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Configuration for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    pub embed_model: String,
    /// Model used for theme/emotion classification.
    pub gen_model: String,
    /// Expected embedding dimension; responses of any other size are rejected.
    pub embed_dimension: usize,
    /// Upper bound for each request, in seconds.
    pub timeout_seconds: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_URL.to_string(),
            api_key: None,
            embed_model: defaults::EMBED_MODEL.to_string(),
            gen_model: defaults::GEN_MODEL.to_string(),
            embed_dimension: defaults::EMBED_DIMENSION,
            timeout_seconds: defaults::PROVIDER_TIMEOUT_SECS,
        }
    }
}

impl OpenAIConfig {
    /// Load from `OPENAI_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            embed_model: std::env::var("OPENAI_EMBED_MODEL").unwrap_or(defaults.embed_model),
            gen_model: std::env::var("OPENAI_GEN_MODEL").unwrap_or(defaults.gen_model),
            embed_dimension: std::env::var("OPENAI_EMBED_DIM")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.embed_dimension),
            timeout_seconds: std::env::var("OPENAI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.embed_dimension = dimension;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// OpenAI-compatible backend serving both embeddings and classification.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            base_url = %config.base_url,
            embed_model = %config.embed_model,
            gen_model = %config.gen_model,
            timeout_secs = config.timeout_seconds,
            "Initializing OpenAI-compatible backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    /// Build a POST request with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }

    /// Turn a non-success response into an error.
    async fn error_from_response(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let body: Option<OpenAIErrorResponse> = response.json().await.ok();
        let (message, error_type) = body
            .map(|b| (b.error.message, b.error.error_type))
            .unwrap_or_else(|| ("Unknown error".to_string(), "unknown".to_string()));
        to_livlib_error(
            OpenAIErrorCode::from_response(status, &error_type),
            &format!("provider returned {}: {}", status, message),
        )
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    #[instrument(skip(self, texts), fields(subsystem = "inference", component = "openai", op = "embed", count = texts.len()))]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let start = Instant::now();

        let request = EmbeddingRequest {
            model: self.config.embed_model.clone(),
            input: texts
                .iter()
                .map(|t| truncate_chars(t, defaults::EMBED_MAX_CHARS))
                .collect(),
            encoding_format: Some("float".to_string()),
        };

        let response = self
            .build_request("/embeddings")
            .json(&request)
            .send()
            .await
            .map_err(from_transport)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let result: EmbeddingResponse = response.json().await.map_err(|e| {
            Error::ProviderUnavailable(format!("Failed to parse embedding response: {}", e))
        })?;

        if result.data.len() != texts.len() {
            return Err(Error::ProviderUnavailable(format!(
                "expected {} embeddings, provider returned {}",
                texts.len(),
                result.data.len()
            )));
        }

        // Sort by index to ensure correct ordering
        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        let mut vectors = Vec::with_capacity(data.len());
        for d in data {
            if d.embedding.len() != self.config.embed_dimension {
                return Err(Error::DimensionMismatch {
                    expected: self.config.embed_dimension,
                    actual: d.embedding.len(),
                });
            }
            vectors.push(Vector::from(d.embedding));
        }

        debug!(
            result_count = vectors.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Generated embeddings"
        );
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl ContentClassifier for OpenAIBackend {
    #[instrument(skip(self, text), fields(subsystem = "inference", component = "openai", op = "classify", text_len = text.len()))]
    async fn classify(&self, text: &str) -> Result<Classification> {
        let start = Instant::now();

        let request = ChatCompletionRequest {
            model: self.config.gen_model.clone(),
            messages: vec![
                ChatMessage::system(CLASSIFY_SYSTEM_PROMPT),
                ChatMessage::user(truncate_chars(text, defaults::EMBED_MAX_CHARS)),
            ],
            temperature: Some(0.0),
            response_format: Some(ResponseFormat::json_object()),
        };

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(from_transport)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let result: ChatCompletionResponse = response.json().await.map_err(|e| {
            Error::ProviderUnavailable(format!("Failed to parse chat response: {}", e))
        })?;

        let content = result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::ProviderUnavailable("classifier returned no choices".into()))?;

        let classification = parse_classification(&content)?;
        debug!(
            theme_count = classification.themes.len(),
            emotion_count = classification.emotions.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Classified fragment text"
        );
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OpenAIConfig::default();
        assert_eq!(config.base_url, DEFAULT_OPENAI_URL);
        assert_eq!(config.embed_model, "text-embedding-3-small");
        assert_eq!(config.embed_dimension, 1536);
        assert_eq!(config.timeout_seconds, 30);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = OpenAIConfig::default()
            .with_base_url("http://localhost:8080/v1")
            .with_api_key("test-key")
            .with_dimension(768)
            .with_timeout_seconds(5);
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.api_key.as_deref(), Some("test-key"));
        assert_eq!(config.embed_dimension, 768);
        assert_eq!(config.timeout_seconds, 5);
    }

    #[test]
    fn test_accessors() {
        let backend = OpenAIBackend::new(OpenAIConfig::default().with_dimension(512)).unwrap();
        assert_eq!(backend.dimension(), 512);
        assert_eq!(backend.model_name(), "text-embedding-3-small");
    }

    #[tokio::test]
    async fn test_embed_empty_input_skips_request() {
        let backend = OpenAIBackend::new(
            OpenAIConfig::default().with_base_url("http://127.0.0.1:9"),
        )
        .unwrap();
        assert!(backend.embed_texts(&[]).await.unwrap().is_empty());
    }
}
