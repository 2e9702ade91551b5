//! Per-student views: plan history, the active plan, and today's redemptions.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use mess_state::{DailyRedemption, Transaction};

use crate::auth::{require_student_or, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::parse_numeric_id;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/students/{id}/transactions", get(history))
        .route("/v1/students/{id}/transactions/active", get(active_plan))
        .route("/v1/students/{id}/redemptions/today", get(redemptions_today))
}

/// GET /v1/students/{id}/transactions: Every plan, newest first.
#[utoipa::path(
    get,
    path = "/v1/students/{id}/transactions",
    params(("id" = i64, Path, description = "Student numeric id")),
    responses((status = 200, description = "Plan history")),
    tag = "students"
)]
pub async fn history(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let id = parse_numeric_id(&id)?;
    require_student_or(&caller, id, Role::MessStaff)?;
    Ok(Json(state.services.ledger.history_for_student(id)))
}

/// GET /v1/students/{id}/transactions/active
#[utoipa::path(
    get,
    path = "/v1/students/{id}/transactions/active",
    params(("id" = i64, Path, description = "Student numeric id")),
    responses(
        (status = 200, description = "The latest active plan"),
        (status = 404, description = "No active plan", body = crate::error::ErrorBody),
    ),
    tag = "students"
)]
pub async fn active_plan(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, AppError> {
    let id = parse_numeric_id(&id)?;
    require_student_or(&caller, id, Role::MessStaff)?;
    Ok(Json(state.services.ledger.active_for_student(id)?))
}

/// GET /v1/students/{id}/redemptions/today: All four flags, false if unseen.
#[utoipa::path(
    get,
    path = "/v1/students/{id}/redemptions/today",
    params(("id" = i64, Path, description = "Student numeric id")),
    responses((status = 200, description = "Today's redemption flags")),
    tag = "students"
)]
pub async fn redemptions_today(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<DailyRedemption>, AppError> {
    let id = parse_numeric_id(&id)?;
    require_student_or(&caller, id, Role::MessStaff)?;
    Ok(Json(state.services.redemptions.status(id)))
}
