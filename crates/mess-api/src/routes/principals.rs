//! # Principals API
//!
//! Admin provisioning of students, mess staff and admins, plus profile
//! reads and updates by the principal themself.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use mess_core::PrincipalKind;
use mess_ledger::{Principal, ProfileUpdate, Registration};

use crate::auth::{require_role, require_self_or_admin, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_json, parse_kind, parse_numeric_id};
use crate::state::AppState;

/// Public view of a principal. Never carries the credential hash.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalView {
    #[schema(value_type = String, example = "student")]
    pub kind: PrincipalKind,
    pub numeric_id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Principal> for PrincipalView {
    fn from(p: &Principal) -> Self {
        Self {
            kind: p.kind,
            numeric_id: p.numeric_id.value(),
            name: p.name.clone(),
            email: p.email.as_str().to_string(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/principals/{kind}", get(list_principals).post(create_principal))
        .route(
            "/v1/principals/{kind}/{id}",
            get(get_principal).patch(update_principal).delete(delete_principal),
        )
}

/// POST /v1/principals/{kind}: Register a principal of any kind.
#[utoipa::path(
    post,
    path = "/v1/principals/{kind}",
    params(("kind" = String, Path, description = "student, mess_staff or admin")),
    responses(
        (status = 201, description = "Principal registered", body = PrincipalView),
        (status = 409, description = "Id or email already registered", body = crate::error::ErrorBody),
    ),
    tag = "principals"
)]
pub async fn create_principal(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(kind): Path<String>,
    body: Result<Json<Registration>, JsonRejection>,
) -> Result<(StatusCode, Json<PrincipalView>), AppError> {
    require_role(&caller, Role::Admin)?;
    let kind = parse_kind(&kind)?;
    let req = extract_json(body)?;
    let principal = state.services.identity.register(kind, req)?;

    if let Some(pool) = &state.db_pool {
        crate::db::principals::upsert(pool, &principal)
            .await
            .map_err(|e| crate::db::write_failed("principal", e))?;
    }

    Ok((StatusCode::CREATED, Json(PrincipalView::from(&principal))))
}

/// GET /v1/principals/{kind}: List principals of a kind, by id.
#[utoipa::path(
    get,
    path = "/v1/principals/{kind}",
    params(("kind" = String, Path, description = "student, mess_staff or admin")),
    responses((status = 200, description = "Principals", body = Vec<PrincipalView>)),
    tag = "principals"
)]
pub async fn list_principals(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(kind): Path<String>,
) -> Result<Json<Vec<PrincipalView>>, AppError> {
    require_role(&caller, Role::Admin)?;
    let kind = parse_kind(&kind)?;
    let list = state.services.identity.list(kind);
    Ok(Json(list.iter().map(PrincipalView::from).collect()))
}

/// GET /v1/principals/{kind}/{id}
#[utoipa::path(
    get,
    path = "/v1/principals/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "student, mess_staff or admin"),
        ("id" = i64, Path, description = "Numeric id"),
    ),
    responses(
        (status = 200, description = "Principal found", body = PrincipalView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "principals"
)]
pub async fn get_principal(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<PrincipalView>, AppError> {
    let kind = parse_kind(&kind)?;
    let id = parse_numeric_id(&id)?;
    require_self_or_admin(&caller, kind, id)?;
    let principal = state.services.identity.find(kind, id)?;
    Ok(Json(PrincipalView::from(&principal)))
}

/// PATCH /v1/principals/{kind}/{id}: Update name, email or credential.
#[utoipa::path(
    patch,
    path = "/v1/principals/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "student, mess_staff or admin"),
        ("id" = i64, Path, description = "Numeric id"),
    ),
    responses(
        (status = 200, description = "Profile updated", body = PrincipalView),
        (status = 409, description = "Email already registered", body = crate::error::ErrorBody),
    ),
    tag = "principals"
)]
pub async fn update_principal(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((kind, id)): Path<(String, String)>,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<PrincipalView>, AppError> {
    let kind = parse_kind(&kind)?;
    let id = parse_numeric_id(&id)?;
    require_self_or_admin(&caller, kind, id)?;
    let update = extract_json(body)?;
    let principal = state.services.identity.update_profile(kind, id, update)?;

    if let Some(pool) = &state.db_pool {
        crate::db::principals::upsert(pool, &principal)
            .await
            .map_err(|e| crate::db::write_failed("principal", e))?;
    }

    Ok(Json(PrincipalView::from(&principal)))
}

/// DELETE /v1/principals/{kind}/{id}
///
/// Staff may remove students; every other kind needs an admin.
#[utoipa::path(
    delete,
    path = "/v1/principals/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "student, mess_staff or admin"),
        ("id" = i64, Path, description = "Numeric id"),
    ),
    responses(
        (status = 204, description = "Principal deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "principals"
)]
pub async fn delete_principal(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((kind, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let kind = parse_kind(&kind)?;
    let id = parse_numeric_id(&id)?;
    let minimum = match kind {
        PrincipalKind::Student => Role::MessStaff,
        PrincipalKind::MessStaff | PrincipalKind::Admin => Role::Admin,
    };
    require_role(&caller, minimum)?;
    state.services.remove_principal(kind, id)?;

    if let Some(pool) = &state.db_pool {
        crate::db::principals::delete(pool, kind, id)
            .await
            .map_err(|e| crate::db::write_failed("principal", e))?;
    }

    Ok(StatusCode::NO_CONTENT)
}
