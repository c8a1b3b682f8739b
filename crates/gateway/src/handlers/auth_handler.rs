//! Authentication handlers.

use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use common::AppResult;
use domain::IdentityResponse;

use crate::clients::TokenResponse;
use crate::extractors::ValidatedJson;
use crate::middleware::{bearer_token, CurrentIdentity};
use crate::state::AppState;

/// Identity registration request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    /// Login name (letters, digits, '_', '.', '-')
    #[validate(length(min = 3, max = 64, message = "Username must be 3-64 characters"))]
    #[schema(example = "raphael")]
    pub username: String,
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "raphael@example.com")]
    pub email: String,
    /// Password; the minimum length is enforced by auth-service
    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "SecurePass123!")]
    pub password: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    #[schema(example = "raphael")]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "SecurePass123!")]
    pub password: String,
}

/// Password change request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub old_password: String,
    #[validate(length(min = 1, message = "New password is required"))]
    pub new_password: String,
}

/// Identity behind the presented token
#[derive(Debug, Serialize, ToSchema)]
pub struct WhoAmIResponse {
    pub identity_id: Uuid,
}

/// Routes open to anonymous callers (rate limited per client)
pub fn credential_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Logout takes the bearer token itself, so a spent or expired token still
/// gets a 204
pub fn logout_routes() -> Router<AppState> {
    Router::new().route("/logout", post(logout))
}

/// Routes that require a valid bearer token
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/whoami", get(whoami))
        .route("/password", post(change_password))
}

/// Register a new identity
#[utoipa::path(
    post,
    path = "/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Identity registered", body = IdentityResponse),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Username or email already taken"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<IdentityResponse>)> {
    let identity = state
        .auth
        .register(payload.username, payload.email, payload.password)
        .await?;

    Ok((StatusCode::CREATED, Json(identity)))
}

/// Log in and receive an access token
#[utoipa::path(
    post,
    path = "/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let token = state.auth.login(payload.username, payload.password).await?;
    Ok(Json(token))
}

/// End the session behind the presented token
#[utoipa::path(
    post,
    path = "/logout",
    tag = "Authentication",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Logged out, or already logged out"),
        (status = 401, description = "Missing, malformed or forged token")
    )
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<StatusCode> {
    let token = bearer_token(&headers)?;
    state.auth.logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Identity of the presented token
#[utoipa::path(
    get,
    path = "/whoami",
    tag = "Authentication",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Authenticated identity", body = WhoAmIResponse),
        (status = 401, description = "Unauthenticated")
    )
)]
pub async fn whoami(Extension(current): Extension<CurrentIdentity>) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        identity_id: current.id,
    })
}

/// Change password; every session of the identity ends
#[utoipa::path(
    post,
    path = "/password",
    tag = "Authentication",
    security(("bearer_auth" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed, all sessions revoked"),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthenticated or wrong current password")
    )
)]
pub async fn change_password(
    Extension(current): Extension<CurrentIdentity>,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    state
        .auth
        .change_password(&current.token, payload.old_password, payload.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
