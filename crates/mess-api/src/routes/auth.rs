//! # Auth API
//!
//! Student self-registration, login for every principal kind, and logout.
//! Register and login are mounted outside the auth middleware.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use mess_core::{PrincipalKind, ValidationErrors};
use mess_crypto::Credential;
use mess_ledger::Registration;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::routes::principals::PrincipalView;
use crate::state::AppState;

/// Login request.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    #[schema(value_type = String)]
    pub credential: Credential,
    /// `student`, `mess_staff` or `admin`. Defaults to `student`.
    #[serde(default)]
    pub kind: Option<String>,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.email.trim().is_empty() {
            errors.push("email", "is required");
        }
        if self.credential.char_count() == 0 {
            errors.push("credential", "is required");
        }
        errors.into_result()
    }
}

/// Session issued by a successful login.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub principal: PrincipalView,
}

/// Routes reachable without a bearer token.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/register", post(register))
        .route("/v1/auth/login", post(login))
}

/// Routes behind the auth middleware.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/auth/logout", post(logout))
}

/// POST /v1/auth/register: Student self-registration.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    responses(
        (status = 201, description = "Student registered", body = PrincipalView),
        (status = 400, description = "Invalid registration", body = crate::error::ErrorBody),
        (status = 409, description = "Id or email already registered", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<Registration>, JsonRejection>,
) -> Result<(StatusCode, Json<PrincipalView>), AppError> {
    let req = extract_json(body)?;
    let principal = state.services.identity.register(PrincipalKind::Student, req)?;

    if let Some(pool) = &state.db_pool {
        crate::db::principals::upsert(pool, &principal)
            .await
            .map_err(|e| crate::db::write_failed("principal", e))?;
    }

    Ok((StatusCode::CREATED, Json(PrincipalView::from(&principal))))
}

/// POST /v1/auth/login: Verify credentials and open a session.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 401, description = "Invalid email or credential", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let kind = match req.kind.as_deref() {
        Some(raw) => raw.parse::<PrincipalKind>()?,
        None => PrincipalKind::Student,
    };
    let (principal, session) = state.services.login(&req.email, &req.credential, kind)?;
    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        principal: PrincipalView::from(&principal),
    }))
}

/// POST /v1/auth/logout: Revoke the caller's session.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses((status = 204, description = "Session revoked")),
    tag = "auth"
)]
pub async fn logout(State(state): State<AppState>, caller: CallerIdentity) -> StatusCode {
    if let Some(token) = &caller.session_token {
        state.services.sessions.revoke(token);
    }
    StatusCode::NO_CONTENT
}
