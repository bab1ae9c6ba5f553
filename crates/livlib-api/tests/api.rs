//! HTTP routes driven through the router with `tower::ServiceExt::oneshot`,
//! backed by the in-memory store and the mock inference backend.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use livlib_api::{router, AppState, Stores};
use livlib_core::{FragmentStatus, Recommendation, Visibility};
use livlib_db::memory::InMemoryStore;
use livlib_db::test_fixtures::FragmentFixture;
use livlib_inference::mock::MockInferenceBackend;
use livlib_search::{
    HybridSearchConfig, LinkingConfig, LiveRecommender, RecommendationSource,
};

fn app_with(
    store: &InMemoryStore,
    backend: MockInferenceBackend,
    recommendations: Option<RecommendationSource>,
) -> Router {
    let stores = Stores::memory(store.clone());
    let recommendations = recommendations.unwrap_or_else(|| {
        RecommendationSource::Live(LiveRecommender::new(
            stores.fragments.clone(),
            stores.vectors.clone(),
        ))
    });
    let state = AppState::new(
        &stores,
        Arc::new(backend),
        HybridSearchConfig::default(),
        LinkingConfig::default(),
        recommendations,
    );
    router(state)
}

fn app(store: &InMemoryStore) -> Router {
    let backend = MockInferenceBackend::new().with_embedding("garden", vec![1.0, 0.0]);
    app_with(store, backend, None)
}

fn get(uri: &str, user: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, user: Option<Uuid>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn seed_garden(store: &InMemoryStore, owner: Uuid) -> (Uuid, Uuid, Uuid) {
    let public = FragmentFixture::new(owner)
        .title("Garden at first light")
        .tags(&["garden"])
        .themes(&["Family"])
        .visibility(Visibility::Public)
        .ready_with(vec![1.0, 0.0])
        .build();
    let private = FragmentFixture::new(owner)
        .title("Garden after the storm")
        .tags(&["garden"])
        .themes(&["Family"])
        .ready_with(vec![0.99, 0.14])
        .build();
    let other = FragmentFixture::new(owner)
        .title("Garden office")
        .themes(&["Career"])
        .visibility(Visibility::Public)
        .ready_with(vec![0.6, 0.8])
        .build();
    let ids = (public.id, private.id, other.id);
    for f in [public, private, other] {
        store.seed(f).await;
    }
    ids
}

fn result_ids(body: &Value) -> Vec<String> {
    body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["fragment"]["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_health_check_sets_request_id() {
    let store = InMemoryStore::new();
    let response = app(&store).oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let (_, body) = send(app(&store), get("/health", None)).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["recommendation_source"], "live");
}

#[tokio::test]
async fn test_create_and_read_fragment() {
    let store = InMemoryStore::new();
    let owner = Uuid::new_v4();

    let (status, created) = send(
        app(&store),
        post(
            "/api/v1/fragments",
            Some(owner),
            json!({"title": "Night train", "body": "Lights of small towns.", "tags": ["Travel"]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "PROCESSING");
    assert_eq!(created["visibility"], "PRIVATE");
    assert_eq!(created["tags"], json!(["travel"]));
    assert!(created.get("embedding").is_none());

    let id = created["id"].as_str().unwrap();
    let (status, fetched) = send(
        app(&store),
        get(&format!("/api/v1/fragments/{}", id), Some(owner)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Night train");

    let (status, body) = send(
        app(&store),
        get(&format!("/api/v1/fragments/{}", id), Some(Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("Forbidden"));

    let (status, _) = send(
        app(&store),
        get(&format!("/api/v1/fragments/{}", Uuid::new_v4()), Some(owner)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_caller_identity_is_required_and_validated() {
    let store = InMemoryStore::new();
    let body = json!({"title": "x", "body": "y"});

    let (status, _) = send(app(&store), post("/api/v1/fragments", None, body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/fragments")
        .header("content-type", "application/json")
        .header("x-user-id", "not-a-uuid")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, body) = send(app(&store), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not a UUID"));
}

#[tokio::test]
async fn test_invalid_fragment_is_rejected() {
    let store = InMemoryStore::new();
    let (status, body) = send(
        app(&store),
        post(
            "/api/v1/fragments",
            Some(Uuid::new_v4()),
            json!({"title": "Blank", "body": "   "}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("body"));
}

#[tokio::test]
async fn test_recompute_and_list_links() {
    let store = InMemoryStore::new();
    let owner = Uuid::new_v4();
    let (public, private, _) = seed_garden(&store, owner).await;

    let (status, outcome) = send(
        app(&store),
        post(
            &format!("/api/v1/fragments/{}/links/recompute", public),
            Some(owner),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(outcome["links_created"].as_u64().unwrap() >= 1);

    let (status, links) = send(
        app(&store),
        get(&format!("/api/v1/fragments/{}/links", public), Some(owner)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let links = links.as_array().unwrap();
    assert!(links.iter().any(|l| l["target_id"] == private.to_string()
        && l["link_type"] == "SEMANTIC"));
}

#[tokio::test]
async fn test_recompute_rejects_foreign_private_and_unready() {
    let store = InMemoryStore::new();
    let owner = Uuid::new_v4();
    let (_, private, _) = seed_garden(&store, owner).await;

    let (status, _) = send(
        app(&store),
        post(
            &format!("/api/v1/fragments/{}/links/recompute", private),
            Some(Uuid::new_v4()),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(store.link_write_count(), 0);

    let pending = FragmentFixture::new(owner)
        .status(FragmentStatus::Processing)
        .build();
    let pending_id = pending.id;
    store.seed(pending).await;
    let (status, _) = send(
        app(&store),
        post(
            &format!("/api/v1/fragments/{}/links/recompute", pending_id),
            Some(owner),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_search_scopes_to_viewer() {
    let store = InMemoryStore::new();
    let owner = Uuid::new_v4();
    let (public, private, _) = seed_garden(&store, owner).await;

    let (status, anonymous) = send(app(&store), get("/api/v1/search?q=garden", None)).await;
    assert_eq!(status, StatusCode::OK);
    let ids = result_ids(&anonymous);
    assert!(ids.contains(&public.to_string()));
    assert!(!ids.contains(&private.to_string()));
    assert_eq!(anonymous["mode"], "hybrid");

    let (_, owned) = send(app(&store), get("/api/v1/search?q=garden", Some(owner))).await;
    assert!(result_ids(&owned).contains(&private.to_string()));

    let (_, filtered) = send(
        app(&store),
        get("/api/v1/search?q=garden&themes=career", Some(owner)),
    )
    .await;
    assert_eq!(result_ids(&filtered).len(), 1);
}

#[tokio::test]
async fn test_search_errors() {
    let store = InMemoryStore::new();
    seed_garden(&store, Uuid::new_v4()).await;

    let (status, _) = send(app(&store), get("/api/v1/search?q=", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    store.fail_vector_search(true);
    store.fail_lexical_search(true);
    let (status, body) = send(app(&store), get("/api/v1/search?q=garden", None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn test_search_degrades_when_embedding_fails() {
    let store = InMemoryStore::new();
    seed_garden(&store, Uuid::new_v4()).await;

    let router = app_with(&store, MockInferenceBackend::new().failing(), None);
    let (status, body) = send(router, get("/api/v1/search?q=garden", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "lexical_only");
    assert!(!body["warnings"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_advanced_search_returns_clusters() {
    let store = InMemoryStore::new();
    let owner = Uuid::new_v4();
    seed_garden(&store, owner).await;

    let (status, body) = send(
        app(&store),
        post(
            "/api/v1/search/advanced",
            Some(owner),
            json!({"query": "garden", "options": {"include_suggestions": false}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 3);
    let clusters = body["clusters"].as_array().unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0]["common_themes"], json!(["Family"]));
    assert_eq!(body["individual_results"].as_array().unwrap().len(), 1);
    assert!(body["suggestions"].as_array().unwrap().is_empty());
    assert_eq!(body["analytics"]["result_count"], 3);
}

#[tokio::test]
async fn test_find_similar_excludes_source() {
    let store = InMemoryStore::new();
    let owner = Uuid::new_v4();
    let (public, private, _) = seed_garden(&store, owner).await;

    let (status, body) = send(
        app(&store),
        get(
            &format!("/api/v1/fragments/{}/similar?limit=5", public),
            Some(owner),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["fragment"]["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.first().copied(), Some(private.to_string().as_str()));
    assert!(!ids.contains(&public.to_string().as_str()));

    let (status, _) = send(
        app(&store),
        get(
            &format!("/api/v1/fragments/{}/similar?limit=0", public),
            Some(owner),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fixture_recommendations() {
    let store = InMemoryStore::new();
    let reader = Uuid::new_v4();
    let own = FragmentFixture::new(reader)
        .visibility(Visibility::Public)
        .build();
    let foreign = FragmentFixture::new(Uuid::new_v4())
        .title("Lighthouse keeper")
        .visibility(Visibility::Public)
        .build();
    let fixture = vec![
        Recommendation {
            fragment: own,
            score: 0.9,
            reason: "Similar to your recent fragments".to_string(),
        },
        Recommendation {
            fragment: foreign.clone(),
            score: 0.8,
            reason: "Similar to your recent fragments".to_string(),
        },
    ];

    let router = app_with(
        &store,
        MockInferenceBackend::new(),
        Some(RecommendationSource::Fixture(fixture)),
    );
    let (status, body) = send(router, get("/api/v1/recommendations", Some(reader))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "fixture");
    let items = body["recommendations"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["fragment"]["id"], foreign.id.to_string());
}

#[tokio::test]
async fn test_openapi_document_lists_schemas() {
    let store = InMemoryStore::new();
    let (status, body) = send(app(&store), get("/api/v1/openapi.json", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["components"]["schemas"]["Fragment"].is_object());
    assert!(body["components"]["schemas"]["AdvancedSearchResponse"].is_object());
}
