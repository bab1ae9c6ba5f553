//! # livlib-api
//!
//! HTTP surface of the Living Library fragment pipeline.
//!
//! Callers are identified by the `X-User-Id` header set by the upstream
//! gateway. Fragment routes require it; search routes fall back to PUBLIC
//! fragments for anonymous callers.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;

use std::sync::Arc;

use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use uuid::Uuid;

use livlib_core::{
    defaults, AuditSink, EmbeddingBackend, FragmentRepository, LexicalSearch, LinkRepository,
    VectorSearch,
};
use livlib_db::{Database, InMemoryStore};
use livlib_search::{
    HybridSearchConfig, HybridSearchCoordinator, LinkMaterializer, LinkingConfig,
    RecommendationSource, SearchService,
};

pub use config::{RecommendationKind, ServerConfig};
pub use error::ApiError;

/// Storage backends behind the pipeline traits.
#[derive(Clone)]
pub struct Stores {
    pub fragments: Arc<dyn FragmentRepository>,
    pub vectors: Arc<dyn VectorSearch>,
    pub text: Arc<dyn LexicalSearch>,
    pub links: Arc<dyn LinkRepository>,
    pub audit: Arc<dyn AuditSink>,
}

impl Stores {
    pub fn postgres(db: &Database) -> Self {
        Self {
            fragments: Arc::new(db.fragments.clone()),
            vectors: Arc::new(db.vectors.clone()),
            text: Arc::new(db.text.clone()),
            links: Arc::new(db.links.clone()),
            audit: Arc::new(db.audit.clone()),
        }
    }

    pub fn memory(store: InMemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            fragments: store.clone(),
            vectors: store.clone(),
            text: store.clone(),
            links: store.clone(),
            audit: store,
        }
    }

    /// Link materializer over these stores.
    pub fn linker(&self, config: LinkingConfig) -> LinkMaterializer {
        LinkMaterializer::new(
            self.fragments.clone(),
            self.vectors.clone(),
            self.links.clone(),
            self.audit.clone(),
        )
        .with_config(config)
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub fragments: Arc<dyn FragmentRepository>,
    pub search: SearchService,
    pub linker: LinkMaterializer,
    pub recommendations: RecommendationSource,
}

impl AppState {
    pub fn new(
        stores: &Stores,
        embedder: Arc<dyn EmbeddingBackend>,
        search_config: HybridSearchConfig,
        linking_config: LinkingConfig,
        recommendations: RecommendationSource,
    ) -> Self {
        let hybrid =
            HybridSearchCoordinator::new(embedder, stores.vectors.clone(), stores.text.clone())
                .with_config(search_config);
        Self {
            fragments: stores.fragments.clone(),
            search: SearchService::new(hybrid, stores.fragments.clone(), stores.vectors.clone()),
            linker: stores.linker(linking_config),
            recommendations,
        }
    }
}

/// OpenAPI component schemas, served at `/api/v1/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Living Library API",
        description = "Fragment search, clustering, linking and recommendations"
    ),
    components(schemas(
        livlib_core::Fragment,
        livlib_core::CreateFragmentRequest,
        livlib_core::Visibility,
        livlib_core::FragmentStatus,
        livlib_core::Link,
        livlib_core::LinkType,
        livlib_core::SearchFilters,
        livlib_core::ScoredFragment,
        livlib_core::HybridWeights,
        livlib_core::SearchCluster,
        livlib_core::TimeSpan,
        livlib_core::Recommendation,
        livlib_search::HybridResponse,
        livlib_search::RetrievalMode,
        livlib_search::AdvancedSearchOptions,
        livlib_search::AdvancedSearchResponse,
        livlib_search::LabelCount,
        livlib_search::SearchAnalytics,
        livlib_search::RecomputeOutcome,
    )),
    tags(
        (name = "Fragments", description = "Fragment intake and links"),
        (name = "Search", description = "Hybrid, similar and advanced search"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let user_id_header = HeaderName::from_static(defaults::USER_ID_HEADER);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/openapi.json", get(handlers::openapi_json))
        .route("/api/v1/fragments", post(handlers::create_fragment))
        .route("/api/v1/fragments/:id", get(handlers::get_fragment))
        .route(
            "/api/v1/fragments/:id/links/recompute",
            post(handlers::recompute_links),
        )
        .route("/api/v1/fragments/:id/links", get(handlers::list_links))
        .route("/api/v1/fragments/:id/similar", get(handlers::find_similar))
        .route("/api/v1/search", get(handlers::semantic_search))
        .route("/api/v1/search/advanced", post(handlers::advanced_search))
        .route("/api/v1/recommendations", get(handlers::recommendations))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, user_id_header]),
        )
        .with_state(state)
}
