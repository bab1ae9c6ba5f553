//! Mock inference backend for deterministic testing.
//!
//! Generates deterministic embeddings and classifications so pipeline tests
//! run without a provider. Specific texts can be pinned to exact vectors or
//! labels, and failures or latency can be injected.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use livlib_inference::mock::MockInferenceBackend;
//!
//! let backend = MockInferenceBackend::new()
//!     .with_dimension(3)
//!     .with_embedding("river walk", vec![1.0, 0.0, 0.0]);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use livlib_core::{
    Classification, ContentClassifier, EmbeddingBackend, Error, Result, Vector,
};

/// Mock backend implementing both provider traits.
#[derive(Clone)]
pub struct MockInferenceBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    embeddings: HashMap<String, Vec<f32>>,
    classifications: HashMap<String, Classification>,
    default_classification: Classification,
    latency: Duration,
    failure_rate: f64,
    fail_classification: bool,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
    pub timestamp: Instant,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 8,
            embeddings: HashMap::new(),
            classifications: HashMap::new(),
            default_classification: Classification::default(),
            latency: Duration::ZERO,
            failure_rate: 0.0,
            fail_classification: false,
        }
    }
}

impl MockInferenceBackend {
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Pin the embedding returned for an exact input text.
    pub fn with_embedding(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Arc::make_mut(&mut self.config)
            .embeddings
            .insert(text.into(), vector);
        self
    }

    /// Pin the classification returned for an exact input text.
    pub fn with_classification(
        mut self,
        text: impl Into<String>,
        classification: Classification,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .classifications
            .insert(text.into(), classification);
        self
    }

    /// Classification returned for texts without a pinned one.
    pub fn with_default_classification(mut self, classification: Classification) -> Self {
        Arc::make_mut(&mut self.config).default_classification = classification;
        self
    }

    /// Delay every call, e.g. to exercise timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config).latency = latency;
        self
    }

    /// Set failure rate (0.0 - 1.0) for testing error handling.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Fail every call.
    pub fn failing(self) -> Self {
        self.with_failure_rate(1.0)
    }

    /// Fail classification calls only.
    pub fn with_failing_classification(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_classification = true;
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.log().clone()
    }

    /// Get number of embed calls.
    pub fn embed_call_count(&self) -> usize {
        self.count("embed")
    }

    /// Get number of classify calls.
    pub fn classify_call_count(&self) -> usize {
        self.count("classify")
    }

    fn log(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.call_log.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn count(&self, operation: &str) -> usize {
        self.log()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    fn log_call(&self, operation: &str, input: &str) {
        self.log().push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
            timestamp: Instant::now(),
        });
    }

    fn should_fail(&self) -> bool {
        use rand::Rng;
        match self.config.failure_rate {
            r if r >= 1.0 => true,
            r if r > 0.0 => rand::thread_rng().gen::<f64>() < r,
            _ => false,
        }
    }

    async fn simulate_latency(&self) {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
    }
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            self.log_call("embed", text);
            self.simulate_latency().await;
            if self.should_fail() {
                return Err(Error::ProviderUnavailable(
                    "simulated embedding failure".to_string(),
                ));
            }
            let vector = self
                .config
                .embeddings
                .get(text)
                .cloned()
                .unwrap_or_else(|| MockEmbeddingGenerator::generate(text, self.config.dimension));
            vectors.push(Vector::from(vector));
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl ContentClassifier for MockInferenceBackend {
    async fn classify(&self, text: &str) -> Result<Classification> {
        self.log_call("classify", text);
        self.simulate_latency().await;
        if self.config.fail_classification || self.should_fail() {
            return Err(Error::ProviderUnavailable(
                "simulated classification failure".to_string(),
            ));
        }
        Ok(self
            .config
            .classifications
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.config.default_classification.clone()))
    }
}

/// Deterministic embedding generator.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Generate a unit vector from text; the same text always yields the
    /// same vector.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];
        if dimension == 0 {
            return vec;
        }

        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }

        Self::normalize(&mut vec);
        vec
    }

    fn normalize(vec: &mut [f32]) {
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
    }
}
