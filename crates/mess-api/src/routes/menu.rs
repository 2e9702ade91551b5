//! # Menu API
//!
//! Per-weekday menu plus a "Specials" board. Reads are open to any caller;
//! writes need mess staff.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use mess_ledger::{MenuEntry, MenuFields};

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_json, parse_day};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/menu", get(list_menu))
        .route(
            "/v1/menu/{day}",
            get(get_menu_day).put(upsert_menu_day).delete(delete_menu_day),
        )
}

/// GET /v1/menu: Every entry, Sun..Sat then Specials.
#[utoipa::path(get, path = "/v1/menu", responses((status = 200, description = "Menu")), tag = "menu")]
pub async fn list_menu(State(state): State<AppState>) -> Json<Vec<MenuEntry>> {
    Json(state.services.menu.list_all())
}

/// GET /v1/menu/{day}
#[utoipa::path(
    get,
    path = "/v1/menu/{day}",
    params(("day" = String, Path, description = "Sun..Sat or Specials")),
    responses(
        (status = 200, description = "Menu entry"),
        (status = 404, description = "No entry for the day", body = crate::error::ErrorBody),
    ),
    tag = "menu"
)]
pub async fn get_menu_day(
    State(state): State<AppState>,
    Path(day): Path<String>,
) -> Result<Json<MenuEntry>, AppError> {
    let day = parse_day(&day)?;
    Ok(Json(state.services.menu.get_day(day)?))
}

/// PUT /v1/menu/{day}: Create or replace an entry.
#[utoipa::path(
    put,
    path = "/v1/menu/{day}",
    params(("day" = String, Path, description = "Sun..Sat or Specials")),
    responses((status = 200, description = "Entry stored")),
    tag = "menu"
)]
pub async fn upsert_menu_day(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(day): Path<String>,
    body: Result<Json<MenuFields>, JsonRejection>,
) -> Result<Json<MenuEntry>, AppError> {
    require_role(&caller, Role::MessStaff)?;
    let day = parse_day(&day)?;
    let fields = extract_json(body)?;
    let entry = state.services.menu.upsert_day(day, fields, &caller.label())?;

    if let Some(pool) = &state.db_pool {
        crate::db::menu::upsert(pool, &entry)
            .await
            .map_err(|e| crate::db::write_failed("menu entry", e))?;
    }

    Ok(Json(entry))
}

/// DELETE /v1/menu/{day}
#[utoipa::path(
    delete,
    path = "/v1/menu/{day}",
    params(("day" = String, Path, description = "Sun..Sat or Specials")),
    responses(
        (status = 204, description = "Entry deleted"),
        (status = 404, description = "No entry for the day", body = crate::error::ErrorBody),
    ),
    tag = "menu"
)]
pub async fn delete_menu_day(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(day): Path<String>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::MessStaff)?;
    let day = parse_day(&day)?;
    state.services.menu.delete_day(day)?;

    if let Some(pool) = &state.db_pool {
        crate::db::menu::delete(pool, day)
            .await
            .map_err(|e| crate::db::write_failed("menu entry", e))?;
    }

    Ok(StatusCode::NO_CONTENT)
}
