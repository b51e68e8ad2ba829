//! Bearer authentication and the identity endpoints

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
    Extension, Json,
};

use crate::error::{ApiError, ApiResult};
use crate::services::identity::{Caller, LoginRequest, Profile, RegisterRequest, TokenResponse};
use crate::AppState;

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authentication middleware
///
/// Applied to protected routes only. Rejects the request with 401 before
/// the handler runs; on success the verified [`Caller`] is available to
/// handlers as an extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;
    let caller = state.identity.authenticate(token)?;

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Json<TokenResponse>> {
    Ok(Json(state.identity.register(request).await?))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    Ok(Json(state.identity.login(request).await?))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Profile>> {
    Ok(Json(state.identity.me(&caller).await?))
}
