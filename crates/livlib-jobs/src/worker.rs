//! Background worker that drains the PROCESSING queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use livlib_core::{defaults, FragmentRepository, Result};

use crate::analyzer::{AnalysisOutcome, FragmentAnalyzer};

/// Configuration for the analysis worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Maximum fragments analysed concurrently.
    pub max_concurrent: usize,
    /// Attempts before a fragment is marked FAILED.
    pub max_attempts: i32,
    /// Seconds before an attempted fragment may be claimed again.
    pub claim_lease_secs: i64,
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::ANALYSIS_POLL_INTERVAL_MS,
            max_concurrent: defaults::ANALYSIS_MAX_CONCURRENT,
            max_attempts: defaults::ANALYSIS_MAX_ATTEMPTS,
            claim_lease_secs: defaults::ANALYSIS_CLAIM_LEASE_SECS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `ANALYSIS_WORKER_ENABLED` | `true` | Enable/disable background analysis |
    /// | `ANALYSIS_MAX_CONCURRENT` | `4` | Max fragments analysed at once |
    /// | `ANALYSIS_POLL_INTERVAL_MS` | `5000` | Polling interval when the queue is empty |
    /// | `ANALYSIS_MAX_ATTEMPTS` | `3` | Attempts before a fragment is FAILED |
    /// | `ANALYSIS_CLAIM_LEASE_SECS` | `300` | Delay before an attempted fragment is retried |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let enabled = std::env::var("ANALYSIS_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent = std::env::var("ANALYSIS_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.max_concurrent)
            .max(1);

        let poll_interval_ms = std::env::var("ANALYSIS_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.poll_interval_ms);

        let max_attempts = std::env::var("ANALYSIS_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(defaults.max_attempts)
            .max(1);

        let claim_lease_secs = std::env::var("ANALYSIS_CLAIM_LEASE_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults.claim_lease_secs)
            .max(0);

        Self {
            poll_interval_ms,
            max_concurrent,
            max_attempts,
            claim_lease_secs,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_max_attempts(mut self, max: i32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    pub fn with_claim_lease_secs(mut self, secs: i64) -> Self {
        self.claim_lease_secs = secs.max(0);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the analysis worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    WorkerStarted,
    WorkerStopped,
    AnalysisStarted { fragment_id: Uuid },
    AnalysisCompleted { fragment_id: Uuid, links_created: usize },
    AnalysisRetrying { fragment_id: Uuid, error: String },
    AnalysisFailed { fragment_id: Uuid, error: String },
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| livlib_core::Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Claims PROCESSING fragments and analyses them concurrently.
pub struct AnalysisWorker {
    fragments: Arc<dyn FragmentRepository>,
    analyzer: Arc<FragmentAnalyzer>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl AnalysisWorker {
    pub fn new(
        fragments: Arc<dyn FragmentRepository>,
        analyzer: FragmentAnalyzer,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        let analyzer = analyzer.with_max_attempts(config.max_attempts);
        Self {
            fragments,
            analyzer: Arc::new(analyzer),
            config,
            event_tx,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Claim one batch and analyse it to completion. Returns the number of
    /// fragments claimed.
    pub async fn run_once(&self) -> Result<usize> {
        let lease = chrono::Duration::seconds(self.config.claim_lease_secs);
        self.fail_abandoned(lease).await;

        let batch = self
            .fragments
            .claim_for_analysis(
                self.config.max_concurrent as i64,
                self.config.max_attempts,
                lease,
            )
            .await?;
        let claimed = batch.len();
        if claimed == 0 {
            return Ok(0);
        }
        debug!(claimed, "Processing concurrent analysis batch");

        let mut tasks = tokio::task::JoinSet::new();
        for fragment in batch {
            let analyzer = self.analyzer.clone();
            let event_tx = self.event_tx.clone();
            tasks.spawn(async move {
                let fragment_id = fragment.id;
                let _ = event_tx.send(WorkerEvent::AnalysisStarted { fragment_id });
                let event = match analyzer.analyze(fragment).await {
                    AnalysisOutcome::Ready { links_created } => Some(WorkerEvent::AnalysisCompleted {
                        fragment_id,
                        links_created,
                    }),
                    AnalysisOutcome::Retrying(error) => {
                        Some(WorkerEvent::AnalysisRetrying { fragment_id, error })
                    }
                    AnalysisOutcome::Failed(error) => {
                        Some(WorkerEvent::AnalysisFailed { fragment_id, error })
                    }
                    AnalysisOutcome::Skipped => None,
                };
                if let Some(event) = event {
                    let _ = event_tx.send(event);
                }
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = ?e, "Analysis task panicked");
            }
        }
        Ok(claimed)
    }

    /// Fail fragments whose final attempt was claimed but never reported
    /// back, e.g. after a panic or a restart mid-analysis.
    async fn fail_abandoned(&self, lease: chrono::Duration) {
        let abandoned = match self
            .fragments
            .fail_abandoned(
                self.config.max_attempts,
                lease,
                defaults::ANALYSIS_ABANDONED_REASON,
            )
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Failed to sweep abandoned fragments");
                return;
            }
        };
        for fragment_id in abandoned {
            warn!(fragment_id = %fragment_id, "Fragment abandoned after final attempt, marked FAILED");
            let _ = self.event_tx.send(WorkerEvent::AnalysisFailed {
                fragment_id,
                error: defaults::ANALYSIS_ABANDONED_REASON.to_string(),
            });
        }
    }

    /// Run the worker loop until shutdown.
    ///
    /// Only sleeps when the queue is empty.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "analysis_worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Analysis worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent,
            max_attempts = self.config.max_attempts,
            "Analysis worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Analysis worker received shutdown signal");
                break;
            }

            let claimed = match self.run_once().await {
                Ok(n) => n,
                Err(e) => {
                    error!(error = %e, "Failed to claim fragments for analysis");
                    0
                }
            };

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Analysis worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Analysis worker stopped");
    }
}
