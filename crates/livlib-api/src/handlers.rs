use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use livlib_core::{defaults, CreateFragmentRequest, SearchFilters};
use livlib_search::access::load_readable;
use livlib_search::AdvancedSearchOptions;

use crate::error::ApiError;
use crate::extract::{Caller, MaybeCaller};
use crate::AppState;

// =============================================================================
// QUERY TYPES
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<i64>,
}

/// Query string of `GET /api/v1/search`. List filters are comma separated.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<i64>,
    pub tags: Option<String>,
    pub themes: Option<String>,
    pub emotions: Option<String>,
    #[serde(default)]
    pub owner_only: bool,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl SearchParams {
    fn filters(&self) -> SearchFilters {
        SearchFilters {
            owner_only: self.owner_only,
            tags: split_list(self.tags.as_deref()),
            themes: split_list(self.themes.as_deref()),
            emotions: split_list(self.emotions.as_deref()),
            created_after: self.created_after,
            created_before: self.created_before,
            ..Default::default()
        }
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Body of `POST /api/v1/search/advanced`.
#[derive(Debug, Deserialize)]
pub struct AdvancedSearchBody {
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub options: AdvancedSearchOptions,
}

// =============================================================================
// SYSTEM
// =============================================================================

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "recommendation_source": state.recommendations.kind(),
    }))
}

pub async fn openapi_json() -> impl IntoResponse {
    use utoipa::OpenApi;
    Json(crate::ApiDoc::openapi())
}

// =============================================================================
// FRAGMENTS
// =============================================================================

pub async fn create_fragment(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(req): Json<CreateFragmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let fragment = state.fragments.insert(user, req).await?;
    info!(fragment_id = %fragment.id, "Fragment queued for analysis");
    Ok((StatusCode::CREATED, Json(fragment)))
}

pub async fn get_fragment(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let fragment = load_readable(state.fragments.as_ref(), user, id).await?;
    Ok(Json(fragment))
}

pub async fn recompute_links(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.linker.recompute_links(user, id).await?;
    Ok(Json(outcome))
}

pub async fn list_links(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let links = state.linker.links_for(user, id).await?;
    Ok(Json(links))
}

pub async fn find_similar(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<Uuid>,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(defaults::SIMILAR_LIMIT);
    let results = state.search.find_similar(user, id, limit).await?;
    Ok(Json(results))
}

// =============================================================================
// SEARCH
// =============================================================================

pub async fn semantic_search(
    State(state): State<AppState>,
    MaybeCaller(viewer): MaybeCaller,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(defaults::PAGE_LIMIT_SEARCH);
    let response = state
        .search
        .semantic_search(viewer, &params.q, params.filters(), limit)
        .await?;
    Ok(Json(response))
}

pub async fn advanced_search(
    State(state): State<AppState>,
    MaybeCaller(viewer): MaybeCaller,
    Json(body): Json<AdvancedSearchBody>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state
        .search
        .advanced_search(viewer, &body.query, body.filters, body.options)
        .await?;
    Ok(Json(response))
}

pub async fn recommendations(
    State(state): State<AppState>,
    Caller(user): Caller,
    Query(params): Query<LimitParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(defaults::RECOMMENDATION_LIMIT);
    let items = state.recommendations.recommend(user, limit).await?;
    Ok(Json(serde_json::json!({
        "source": state.recommendations.kind(),
        "recommendations": items,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_trims_and_drops_empty() {
        assert_eq!(
            split_list(Some(" family, ,travel ")),
            vec!["family".to_string(), "travel".to_string()]
        );
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn test_search_params_build_filters() {
        let params = SearchParams {
            q: "rain".into(),
            tags: Some("walk".into()),
            owner_only: true,
            ..Default::default()
        };
        let filters = params.filters();
        assert!(filters.owner_only);
        assert_eq!(filters.tags, vec!["walk"]);
        assert!(filters.viewer_id.is_none());
    }
}
