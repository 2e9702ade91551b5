//! # Pricing API
//!
//! Price sheets are append-only. Activating one (new or stored) makes it
//! the single active sheet; historical lookups use `effectiveFrom`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use mess_core::MessError;
use mess_ledger::{PriceSheet, PriceSheetDraft};

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, parse_price_sheet_id};
use crate::state::AppState;

/// Query for `/v1/prices/as-of`.
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct AsOfQuery {
    /// RFC 3339 instant, or a `YYYY-MM-DD` date meaning the end of that UTC day.
    pub at: String,
}

/// Parse an `at` parameter. A bare date covers every sheet effective on it.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            MessError::invalid_field("at", "must be an RFC 3339 instant or YYYY-MM-DD").into()
        })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/prices", get(list_prices).post(activate_price_sheet))
        .route("/v1/prices/active", get(active_price_sheet))
        .route("/v1/prices/as-of", get(price_as_of))
        .route("/v1/prices/{id}/activate", post(reactivate_price_sheet))
}

/// GET /v1/prices: All sheets, newest `effectiveFrom` first.
#[utoipa::path(
    get,
    path = "/v1/prices",
    responses((status = 200, description = "Price sheets")),
    tag = "prices"
)]
pub async fn list_prices(State(state): State<AppState>) -> Json<Vec<PriceSheet>> {
    Json(state.services.pricing.list())
}

/// POST /v1/prices: Store a new sheet and make it the active one.
#[utoipa::path(
    post,
    path = "/v1/prices",
    responses(
        (status = 201, description = "Sheet activated"),
        (status = 400, description = "Missing or negative prices", body = crate::error::ErrorBody),
    ),
    tag = "prices"
)]
pub async fn activate_price_sheet(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<PriceSheetDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<PriceSheet>), AppError> {
    require_role(&caller, Role::MessStaff)?;
    let draft = extract_json(body)?;
    let sheet = state.services.pricing.activate(draft)?;

    if let Some(pool) = &state.db_pool {
        crate::db::price_sheets::insert_active(pool, &sheet)
            .await
            .map_err(|e| crate::db::write_failed("price sheet", e))?;
    }

    Ok((StatusCode::CREATED, Json(sheet)))
}

/// POST /v1/prices/{id}/activate: Re-activate a stored sheet.
#[utoipa::path(
    post,
    path = "/v1/prices/{id}/activate",
    params(("id" = String, Path, description = "Price sheet id")),
    responses(
        (status = 200, description = "Sheet activated"),
        (status = 404, description = "Unknown sheet", body = crate::error::ErrorBody),
    ),
    tag = "prices"
)]
pub async fn reactivate_price_sheet(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<PriceSheet>, AppError> {
    require_role(&caller, Role::MessStaff)?;
    let id = parse_price_sheet_id(&id)?;
    let sheet = state.services.pricing.activate_existing(id)?;

    if let Some(pool) = &state.db_pool {
        crate::db::price_sheets::activate_existing(pool, id)
            .await
            .map_err(|e| crate::db::write_failed("price sheet", e))?;
    }

    Ok(Json(sheet))
}

/// GET /v1/prices/active
#[utoipa::path(
    get,
    path = "/v1/prices/active",
    responses(
        (status = 200, description = "The active sheet"),
        (status = 404, description = "No active sheet", body = crate::error::ErrorBody),
    ),
    tag = "prices"
)]
pub async fn active_price_sheet(State(state): State<AppState>) -> Result<Json<PriceSheet>, AppError> {
    Ok(Json(state.services.pricing.active_sheet()?))
}

/// GET /v1/prices/as-of?at=: The sheet in force at an instant.
#[utoipa::path(
    get,
    path = "/v1/prices/as-of",
    params(AsOfQuery),
    responses(
        (status = 200, description = "The sheet in force"),
        (status = 404, description = "No sheet effective yet", body = crate::error::ErrorBody),
    ),
    tag = "prices"
)]
pub async fn price_as_of(
    State(state): State<AppState>,
    query: Result<Query<AsOfQuery>, QueryRejection>,
) -> Result<Json<PriceSheet>, AppError> {
    let query = extract_query(query)?;
    let at = parse_instant(&query.at)?;
    Ok(Json(state.services.pricing.price_as_of(at)?))
}
