//! Analysis of a single claimed fragment.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use livlib_core::{
    defaults, ContentClassifier, EmbeddingBackend, Error, Fragment, FragmentAnalysis,
    FragmentRepository, FragmentStatus, Result,
};
use livlib_search::LinkMaterializer;

/// What happened to a fragment after one analysis attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// Fragment is READY; `links_created` is 0 when the link recompute failed.
    Ready { links_created: usize },
    /// Attempt failed, the fragment stays PROCESSING for another try.
    Retrying(String),
    /// Attempts exhausted or the failure is permanent; the fragment is FAILED.
    Failed(String),
    /// Fragment left PROCESSING while it was being analysed.
    Skipped,
}

/// Embeds, classifies and links one fragment.
pub struct FragmentAnalyzer {
    fragments: Arc<dyn FragmentRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
    classifier: Arc<dyn ContentClassifier>,
    linker: LinkMaterializer,
    max_attempts: i32,
    provider_timeout: Duration,
}

impl FragmentAnalyzer {
    pub fn new(
        fragments: Arc<dyn FragmentRepository>,
        embedder: Arc<dyn EmbeddingBackend>,
        classifier: Arc<dyn ContentClassifier>,
        linker: LinkMaterializer,
    ) -> Self {
        Self {
            fragments,
            embedder,
            classifier,
            linker,
            max_attempts: defaults::ANALYSIS_MAX_ATTEMPTS,
            provider_timeout: Duration::from_secs(defaults::PROVIDER_TIMEOUT_SECS),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    /// Run one analysis attempt. Never returns an error: failures are
    /// recorded on the fragment instead.
    #[instrument(skip(self, fragment), fields(
        subsystem = "jobs",
        component = "analyzer",
        op = "analyze",
        fragment_id = %fragment.id,
        attempt = fragment.analysis_attempts,
    ))]
    pub async fn analyze(&self, fragment: Fragment) -> AnalysisOutcome {
        let start = Instant::now();
        let id = fragment.id;

        let ready = match self.embed_and_classify(&fragment).await {
            Ok(ready) => ready,
            Err(Error::Conflict(reason)) => {
                info!(%reason, "Fragment changed state during analysis, skipping");
                return AnalysisOutcome::Skipped;
            }
            Err(e) => return self.record_failure(id, e).await,
        };

        let links_created = match self.linker.recompute_links(ready.user_id, id).await {
            Ok(outcome) => outcome.links_created,
            Err(e) => {
                // The fragment stays READY; links can be recomputed on demand
                warn!(error = %e, "Link recompute after analysis failed");
                0
            }
        };

        info!(
            theme_count = ready.themes.len(),
            links_created,
            duration_ms = start.elapsed().as_millis() as u64,
            "Fragment analysed"
        );
        AnalysisOutcome::Ready { links_created }
    }

    async fn embed_and_classify(&self, fragment: &Fragment) -> Result<Fragment> {
        let input = fragment.embedding_input(defaults::EMBED_MAX_CHARS);
        let texts = [input.clone()];

        let (embeddings, classification) = tokio::try_join!(
            self.bounded("embedding", self.embedder.embed_texts(&texts)),
            self.bounded("classification", self.classifier.classify(&input)),
        )?;

        let embedding = embeddings.into_iter().next().ok_or_else(|| {
            Error::ProviderUnavailable("embedding provider returned no vector".to_string())
        })?;
        let classification = classification.normalized();

        self.fragments
            .mark_ready(
                fragment.id,
                FragmentAnalysis {
                    embedding,
                    themes: classification.themes,
                    emotions: classification.emotions,
                },
            )
            .await
    }

    async fn bounded<T>(
        &self,
        what: &str,
        call: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.provider_timeout, call)
            .await
            .map_err(|_| {
                Error::ProviderUnavailable(format!(
                    "{} timed out after {}s",
                    what,
                    self.provider_timeout.as_secs_f32()
                ))
            })?
    }

    async fn record_failure(&self, id: Uuid, cause: Error) -> AnalysisOutcome {
        let reason = cause.to_string();

        // A malformed provider reply fails the same way on every attempt
        if matches!(cause, Error::DimensionMismatch { .. } | Error::InvalidInput(_)) {
            return match self.fragments.mark_failed(id, &reason).await {
                Ok(()) => {
                    warn!(%reason, "Fragment analysis failed permanently");
                    AnalysisOutcome::Failed(reason)
                }
                Err(e) => {
                    error!(error = %e, %reason, "Failed to mark fragment FAILED");
                    AnalysisOutcome::Retrying(reason)
                }
            };
        }

        match self
            .fragments
            .record_attempt_failure(id, &reason, self.max_attempts)
            .await
        {
            Ok(FragmentStatus::Failed) => {
                warn!(%reason, "Fragment analysis failed, attempts exhausted");
                AnalysisOutcome::Failed(reason)
            }
            Ok(_) => {
                warn!(%reason, "Fragment analysis failed, will retry");
                AnalysisOutcome::Retrying(reason)
            }
            Err(e) => {
                error!(error = %e, %reason, "Failed to record analysis failure");
                AnalysisOutcome::Retrying(reason)
            }
        }
    }
}
