//! Caller identity extractors.
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! user id in the `X-User-Id` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use livlib_core::defaults;

use crate::error::ApiError;

/// Authenticated caller. Rejects requests without a valid `X-User-Id`.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Uuid);

/// Caller identity when present; anonymous requests yield `None`.
///
/// A header that is present but malformed is still rejected.
#[derive(Debug, Clone, Copy)]
pub struct MaybeCaller(pub Option<Uuid>);

fn parse_user_id(parts: &Parts) -> Result<Option<Uuid>, ApiError> {
    let Some(value) = parts.headers.get(defaults::USER_ID_HEADER) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("X-User-Id header is not valid text".to_string()))?;
    Uuid::parse_str(raw.trim())
        .map(Some)
        .map_err(|_| ApiError::BadRequest(format!("X-User-Id '{}' is not a UUID", raw.trim())))
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parse_user_id(parts)?
            .map(Caller)
            .ok_or_else(|| ApiError::Unauthorized("X-User-Id header required".to_string()))
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MaybeCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeCaller(parse_user_id(parts)?))
    }
}
