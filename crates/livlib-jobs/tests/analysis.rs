//! Background analysis against the in-memory store and mock providers.

use std::sync::Arc;
use std::time::Duration;

use livlib_core::{
    Classification, CreateFragmentRequest, FragmentRepository, FragmentStatus, LinkType,
};
use livlib_db::memory::InMemoryStore;
use livlib_inference::mock::MockInferenceBackend;
use livlib_jobs::{AnalysisWorker, FragmentAnalyzer, WorkerConfig, WorkerEvent};
use livlib_search::LinkMaterializer;
use uuid::Uuid;

fn analyzer(store: &Arc<InMemoryStore>, backend: MockInferenceBackend) -> FragmentAnalyzer {
    let backend = Arc::new(backend);
    let linker = LinkMaterializer::new(store.clone(), store.clone(), store.clone(), store.clone());
    FragmentAnalyzer::new(store.clone(), backend.clone(), backend, linker)
}

fn worker(store: &Arc<InMemoryStore>, backend: MockInferenceBackend, config: WorkerConfig) -> AnalysisWorker {
    AnalysisWorker::new(store.clone(), analyzer(store, backend), config)
}

fn request(title: &str, tags: &[&str]) -> CreateFragmentRequest {
    CreateFragmentRequest {
        title: title.to_string(),
        body: format!("{} in some detail.", title),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

fn family() -> Classification {
    Classification {
        themes: vec!["Family".to_string(), "Home".to_string()],
        emotions: vec!["Warmth".to_string()],
    }
}

#[tokio::test]
async fn test_analysis_marks_ready_with_classification() {
    let store = Arc::new(InMemoryStore::new());
    let owner = Uuid::new_v4();
    let fragment = store.insert(owner, request("Sunday lunch", &[])).await.unwrap();

    let backend = MockInferenceBackend::new().with_default_classification(family());
    let worker = worker(&store, backend.clone(), WorkerConfig::default());
    let mut events = worker.events();

    assert_eq!(worker.run_once().await.unwrap(), 1);

    let stored = store.get(fragment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, FragmentStatus::Ready);
    assert_eq!(stored.themes, vec!["Family", "Home"]);
    assert_eq!(stored.emotions, vec!["Warmth"]);
    assert_eq!(stored.embedding.unwrap().as_slice().len(), 8);
    assert_eq!(backend.embed_call_count(), 1);
    assert_eq!(backend.classify_call_count(), 1);
    assert!(backend
        .get_calls()
        .iter()
        .any(|c| c.operation == "embed" && c.input.starts_with("Sunday lunch")));

    assert_eq!(
        events.recv().await.unwrap(),
        WorkerEvent::AnalysisStarted {
            fragment_id: fragment.id
        }
    );
    assert!(matches!(
        events.recv().await.unwrap(),
        WorkerEvent::AnalysisCompleted { fragment_id, .. } if fragment_id == fragment.id
    ));

    // nothing left to claim
    assert_eq!(worker.run_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_analysis_recomputes_links() {
    let store = Arc::new(InMemoryStore::new());
    let owner = Uuid::new_v4();
    let first = store
        .insert(owner, request("Harbour at dawn", &["harbour"]))
        .await
        .unwrap();
    let second = store
        .insert(owner, request("Harbour at dusk", &["harbour", "dusk"]))
        .await
        .unwrap();

    let config = WorkerConfig::default().with_max_concurrent(1);
    let worker = worker(&store, MockInferenceBackend::new(), config);
    assert_eq!(worker.run_once().await.unwrap(), 1);
    assert_eq!(worker.run_once().await.unwrap(), 1);

    // whichever fragment was analysed last owns the link
    let pair = [first.id, second.id];
    let links = store.all_links().await;
    assert!(links.iter().any(|l| l.link_type == LinkType::SharedTag
        && pair.contains(&l.source_id)
        && pair.contains(&l.target_id)));
    assert_eq!(store.audit_records().await.len(), 2);
}

#[tokio::test]
async fn test_failures_retry_then_mark_failed() {
    let store = Arc::new(InMemoryStore::new());
    let fragment = store
        .insert(Uuid::new_v4(), request("Lost notes", &[]))
        .await
        .unwrap();

    let config = WorkerConfig::default()
        .with_max_attempts(2)
        .with_claim_lease_secs(0);
    let worker = worker(&store, MockInferenceBackend::new().failing(), config);
    let mut events = worker.events();

    assert_eq!(worker.run_once().await.unwrap(), 1);
    let stored = store.get(fragment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, FragmentStatus::Processing);
    assert!(stored.failure_reason.is_some());

    assert_eq!(worker.run_once().await.unwrap(), 1);
    let stored = store.get(fragment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, FragmentStatus::Failed);
    assert!(stored.embedding.is_none());
    assert!(stored
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("Provider unavailable"));

    assert_eq!(worker.run_once().await.unwrap(), 0);

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event);
    }
    assert!(matches!(kinds[1], WorkerEvent::AnalysisRetrying { .. }));
    assert!(matches!(kinds[3], WorkerEvent::AnalysisFailed { .. }));
}

#[tokio::test]
async fn test_abandoned_final_attempt_is_failed() {
    let store = Arc::new(InMemoryStore::new());
    let fragment = store
        .insert(Uuid::new_v4(), request("Interrupted", &[]))
        .await
        .unwrap();

    // the only allowed attempt is claimed but never reports back
    let claimed = store
        .claim_for_analysis(10, 1, chrono::Duration::zero())
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    for _ in 0..3 {
        assert!(store
            .claim_for_analysis(10, 1, chrono::Duration::zero())
            .await
            .unwrap()
            .is_empty());
    }

    let config = WorkerConfig::default()
        .with_max_attempts(1)
        .with_claim_lease_secs(0);
    let worker = worker(&store, MockInferenceBackend::new(), config);
    let mut events = worker.events();

    assert_eq!(worker.run_once().await.unwrap(), 0);
    let stored = store.get(fragment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, FragmentStatus::Failed);
    assert_eq!(stored.failure_reason.as_deref(), Some("analysis abandoned"));
    assert_eq!(
        events.try_recv().unwrap(),
        WorkerEvent::AnalysisFailed {
            fragment_id: fragment.id,
            error: "analysis abandoned".to_string(),
        }
    );
}

#[tokio::test]
async fn test_abandoned_sweep_waits_for_lease() {
    let store = Arc::new(InMemoryStore::new());
    let fragment = store
        .insert(Uuid::new_v4(), request("Still running", &[]))
        .await
        .unwrap();
    store
        .claim_for_analysis(10, 1, chrono::Duration::zero())
        .await
        .unwrap();

    let config = WorkerConfig::default()
        .with_max_attempts(1)
        .with_claim_lease_secs(300);
    worker(&store, MockInferenceBackend::new(), config)
        .run_once()
        .await
        .unwrap();

    let stored = store.get(fragment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, FragmentStatus::Processing);
}

#[tokio::test]
async fn test_classification_failure_fails_attempt() {
    let store = Arc::new(InMemoryStore::new());
    let fragment = store
        .insert(Uuid::new_v4(), request("Half a thought", &[]))
        .await
        .unwrap();

    let config = WorkerConfig::default().with_max_attempts(1);
    let backend = MockInferenceBackend::new().with_failing_classification();
    worker(&store, backend, config).run_once().await.unwrap();

    let stored = store.get(fragment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, FragmentStatus::Failed);
    assert!(stored.themes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_times_out() {
    let store = Arc::new(InMemoryStore::new());
    let fragment = store
        .insert(Uuid::new_v4(), request("Waiting room", &[]))
        .await
        .unwrap();

    let backend = MockInferenceBackend::new().with_latency(Duration::from_secs(120));
    let analyzer = analyzer(&store, backend).with_provider_timeout(Duration::from_secs(30));
    let config = WorkerConfig::default().with_max_attempts(3);
    let worker = AnalysisWorker::new(store.clone(), analyzer, config);

    worker.run_once().await.unwrap();
    let stored = store.get(fragment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, FragmentStatus::Processing);
    assert!(stored.failure_reason.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_worker_start_and_shutdown() {
    let store = Arc::new(InMemoryStore::new());
    let fragment = store
        .insert(Uuid::new_v4(), request("Background", &[]))
        .await
        .unwrap();

    let config = WorkerConfig::default().with_poll_interval(10);
    let worker = worker(&store, MockInferenceBackend::new(), config);
    let mut events = worker.events();
    let handle = worker.start();

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(WorkerEvent::AnalysisCompleted { fragment_id, .. }) => break fragment_id,
                Ok(_) => continue,
                Err(e) => panic!("event channel closed: {e}"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(completed, fragment.id);

    handle.shutdown().await.unwrap();
    let stopped = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(WorkerEvent::WorkerStopped) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    })
    .await;
    assert!(stopped.is_ok());
}

#[tokio::test]
async fn test_disabled_worker_does_nothing() {
    let store = Arc::new(InMemoryStore::new());
    let fragment = store
        .insert(Uuid::new_v4(), request("Idle", &[]))
        .await
        .unwrap();

    let config = WorkerConfig::default().with_enabled(false);
    let handle = worker(&store, MockInferenceBackend::new(), config).start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let _ = handle.shutdown().await;

    let stored = store.get(fragment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, FragmentStatus::Processing);
}
