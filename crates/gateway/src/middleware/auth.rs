//! Authentication middleware.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use uuid::Uuid;

use common::{AppError, AppResult};

use crate::state::AppState;

/// Identity resolved from the request's bearer token.
#[derive(Debug, Clone)]
pub struct CurrentIdentity {
    pub id: Uuid,
    /// The presented token, needed again for password change
    pub token: String,
}

/// Resolves the bearer token through auth-service and stores the identity
/// in request extensions. Missing, malformed, expired or revoked tokens all
/// end with the same 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;
    let id = state.auth.authenticate(&token).await?;

    request
        .extensions_mut()
        .insert(CurrentIdentity { id, token });

    Ok(next.run(request).await)
}

/// The bearer token of a request; absent or empty is `Unauthenticated`.
pub fn bearer_token(headers: &HeaderMap) -> AppResult<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|Authorization(bearer)| bearer.token().to_string())
        .filter(|token| !token.is_empty())
        .ok_or(AppError::Unauthenticated)
}
