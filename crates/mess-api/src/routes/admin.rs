//! Admin dashboard.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use mess_ledger::AdminSummary;

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/admin/summary", get(summary))
}

/// GET /v1/admin/summary: Principal and plan counts, revenue, today's meals.
#[utoipa::path(
    get,
    path = "/v1/admin/summary",
    responses(
        (status = 200, description = "Dashboard figures"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn summary(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<AdminSummary>, AppError> {
    require_role(&caller, Role::Admin)?;
    Ok(Json(state.services.summary()))
}
