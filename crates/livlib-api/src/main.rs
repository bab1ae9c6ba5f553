use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use livlib_api::{router, AppState, RecommendationKind, ServerConfig, Stores};
use livlib_db::{log_pool_metrics, Database, InMemoryStore, PoolConfig};
use livlib_inference::OpenAIBackend;
use livlib_jobs::{AnalysisWorker, FragmentAnalyzer, WorkerConfig};
use livlib_search::{
    HybridSearchConfig, LinkingConfig, LiveRecommender, RecommendationSource,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   RUST_LOG    - standard env filter (default: debug for livlib crates and tower_http)
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "livlib_api=debug,livlib_search=debug,livlib_jobs=debug,tower_http=debug".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("livlib-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = ServerConfig::from_env()?;

    let stores = if config.uses_memory_store() {
        warn!("DATABASE_URL=memory, fragments will not survive a restart");
        Stores::memory(InMemoryStore::new())
    } else {
        let db = Database::connect_with_config(&config.database_url, PoolConfig::from_env()).await?;
        db.migrate().await?;
        log_pool_metrics(db.pool());
        info!("Database connected and migrated");
        Stores::postgres(&db)
    };

    let backend = Arc::new(OpenAIBackend::from_env()?);
    let search_config = HybridSearchConfig::from_env();
    let linking_config = LinkingConfig::from_env();
    let provider_timeout = search_config.provider_timeout;

    let recommendations = match config.recommendation_source {
        RecommendationKind::Live => RecommendationSource::Live(LiveRecommender::new(
            stores.fragments.clone(),
            stores.vectors.clone(),
        )),
        RecommendationKind::Fixture => RecommendationSource::Fixture(config.load_fixture()?),
    };
    info!(source = recommendations.kind(), "Recommendation source selected");

    let state = AppState::new(
        &stores,
        backend.clone(),
        search_config,
        linking_config.clone(),
        recommendations,
    );

    let analyzer = FragmentAnalyzer::new(
        stores.fragments.clone(),
        backend.clone(),
        backend,
        stores.linker(linking_config),
    )
    .with_provider_timeout(provider_timeout);
    let worker = AnalysisWorker::new(stores.fragments.clone(), analyzer, WorkerConfig::from_env())
        .start();

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    if let Err(e) = worker.shutdown().await {
        warn!(error = %e, "Analysis worker already stopped");
    }
    Ok(())
}
