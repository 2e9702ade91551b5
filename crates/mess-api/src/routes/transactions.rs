//! # Transactions API
//!
//! Plan purchase and extension, payment settlement, cancellation, the
//! extension chain of a record, and an on-demand expiry sweep.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use mess_core::{NumericId, TransactionId, ValidationErrors};
use mess_ledger::{ExtendRequest, PurchaseRequest};
use mess_state::{PaymentStatus, Transaction};

use crate::auth::{require_role, require_student_or, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, parse_transaction_id, Validate};
use crate::state::AppState;

const MAX_REASON_CHARS: usize = 500;
const DEFAULT_CANCEL_REASON: &str = "canceled by staff";

/// Payment settlement request.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// `completed`, `failed` or `refunded`.
    pub payment_status: String,
}

impl Validate for PaymentRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.payment_status.parse::<PaymentStatus>().is_err() {
            errors.push("paymentStatus", "must be pending, completed, failed or refunded");
        }
        errors.into_result()
    }
}

/// Cancellation request. The body is optional.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

impl Validate for CancelRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(reason) = &self.reason {
            if reason.chars().count() > MAX_REASON_CHARS {
                errors.push("reason", format!("must be at most {MAX_REASON_CHARS} characters"));
            }
        }
        errors.into_result()
    }
}

/// Sweep request. `today` overrides the clock's current date.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SweepRequest {
    #[serde(default)]
    #[schema(value_type = Option<String>, format = Date)]
    pub today: Option<NaiveDate>,
}

/// Sweep result.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    pub expired: usize,
    #[schema(value_type = Vec<String>)]
    pub transaction_ids: Vec<TransactionId>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/transactions", post(purchase))
        .route("/v1/transactions/extend", post(extend))
        .route("/v1/transactions/sweep", post(sweep))
        .route("/v1/transactions/{id}", get(get_transaction))
        .route("/v1/transactions/{id}/chain", get(get_chain))
        .route("/v1/transactions/{id}/payment", post(settle_payment))
        .route("/v1/transactions/{id}/cancel", post(cancel))
}

/// Students may only act on their own id.
fn require_acting_for(caller: &CallerIdentity, student_id: Option<i64>) -> Result<(), AppError> {
    match student_id.and_then(|id| NumericId::new(id).ok()) {
        Some(id) => require_student_or(caller, id, Role::MessStaff),
        // Missing or malformed ids are reported by validation.
        None => Ok(()),
    }
}

/// Students cannot settle their own payment; their plans open as pending
/// until staff record the payment.
fn payment_status_for(caller: &CallerIdentity, requested: Option<String>) -> Option<String> {
    if caller.has_role(Role::MessStaff) {
        return requested;
    }
    if requested.as_deref().is_some_and(|s| s != PaymentStatus::Pending.as_str()) {
        tracing::info!(caller = %caller.label(), "student-submitted payment status reset to pending");
    }
    Some(PaymentStatus::Pending.as_str().to_string())
}

/// Write a changed record through to the database.
pub(crate) async fn persist(state: &AppState, tx: &Transaction) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        crate::db::transactions::upsert(pool, tx)
            .await
            .map_err(|e| crate::db::write_failed("transaction", e))?;
    }
    Ok(())
}

/// POST /v1/transactions: Purchase a plan.
#[utoipa::path(
    post,
    path = "/v1/transactions",
    responses(
        (status = 201, description = "Plan purchased; carries the redemption token"),
        (status = 400, description = "Every invalid field", body = crate::error::ErrorBody),
    ),
    tag = "transactions"
)]
pub async fn purchase(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let mut req = extract_json(body)?;
    require_acting_for(&caller, req.student_id)?;
    req.payment_status = payment_status_for(&caller, req.payment_status.take());
    let tx = state.services.ledger.purchase(req)?;
    persist(&state, &tx).await?;
    metrics::counter!("mess_plans_purchased_total", "plan" => tx.plan_type.as_str()).increment(1);
    Ok((StatusCode::CREATED, Json(tx)))
}

/// POST /v1/transactions/extend: Extend the latest active plan.
#[utoipa::path(
    post,
    path = "/v1/transactions/extend",
    responses(
        (status = 201, description = "Extension created"),
        (status = 404, description = "No active plan to extend", body = crate::error::ErrorBody),
        (status = 409, description = "Plan already extended", body = crate::error::ErrorBody),
    ),
    tag = "transactions"
)]
pub async fn extend(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<ExtendRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let mut req = extract_json(body)?;
    require_acting_for(&caller, req.student_id)?;
    req.payment_status = payment_status_for(&caller, req.payment_status.take());
    let tx = state.services.ledger.extend(req)?;
    persist(&state, &tx).await?;
    metrics::counter!("mess_plans_extended_total", "plan" => tx.plan_type.as_str()).increment(1);
    Ok((StatusCode::CREATED, Json(tx)))
}

/// GET /v1/transactions/{id}
#[utoipa::path(
    get,
    path = "/v1/transactions/{id}",
    params(("id" = String, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction"),
        (status = 404, description = "Unknown transaction", body = crate::error::ErrorBody),
    ),
    tag = "transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, AppError> {
    let id = parse_transaction_id(&id)?;
    let tx = state.services.ledger.get(id)?;
    require_student_or(&caller, tx.student_id, Role::MessStaff)?;
    Ok(Json(tx))
}

/// GET /v1/transactions/{id}/chain: The record and its predecessors, newest first.
#[utoipa::path(
    get,
    path = "/v1/transactions/{id}/chain",
    params(("id" = String, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Extension chain"),
        (status = 404, description = "Unknown transaction", body = crate::error::ErrorBody),
        (status = 422, description = "Chain is corrupt", body = crate::error::ErrorBody),
    ),
    tag = "transactions"
)]
pub async fn get_chain(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let id = parse_transaction_id(&id)?;
    let tx = state.services.ledger.get(id)?;
    require_student_or(&caller, tx.student_id, Role::MessStaff)?;
    Ok(Json(state.services.ledger.chain(id)?))
}

/// POST /v1/transactions/{id}/payment: Settle a pending payment.
#[utoipa::path(
    post,
    path = "/v1/transactions/{id}/payment",
    params(("id" = String, Path, description = "Transaction id")),
    request_body = PaymentRequest,
    responses(
        (status = 200, description = "Payment settled"),
        (status = 422, description = "Payment already settled", body = crate::error::ErrorBody),
    ),
    tag = "transactions"
)]
pub async fn settle_payment(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Json<Transaction>, AppError> {
    require_role(&caller, Role::MessStaff)?;
    let id = parse_transaction_id(&id)?;
    let req = extract_validated_json(body)?;
    let status: PaymentStatus = req.payment_status.parse()?;
    let tx = state.services.ledger.settle_payment(id, status)?;
    persist(&state, &tx).await?;
    Ok(Json(tx))
}

/// POST /v1/transactions/{id}/cancel
#[utoipa::path(
    post,
    path = "/v1/transactions/{id}/cancel",
    params(("id" = String, Path, description = "Transaction id")),
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Plan canceled"),
        (status = 422, description = "Plan already expired or canceled", body = crate::error::ErrorBody),
    ),
    tag = "transactions"
)]
pub async fn cancel(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Transaction>, AppError> {
    require_role(&caller, Role::MessStaff)?;
    let id = parse_transaction_id(&id)?;
    let req = body.map(|Json(b)| b).unwrap_or_default();
    req.validate()?;
    let reason = req
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_CANCEL_REASON);
    let tx = state.services.ledger.cancel(id, reason)?;
    persist(&state, &tx).await?;
    Ok(Json(tx))
}

/// POST /v1/transactions/sweep: Expire every overdue plan now.
#[utoipa::path(
    post,
    path = "/v1/transactions/sweep",
    request_body = SweepRequest,
    responses((status = 200, description = "Sweep result", body = SweepResponse)),
    tag = "transactions"
)]
pub async fn sweep(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Option<Json<SweepRequest>>,
) -> Result<Json<SweepResponse>, AppError> {
    require_role(&caller, Role::MessStaff)?;
    let req = body.map(|Json(b)| b).unwrap_or_default();
    let expired = match req.today {
        Some(today) => state.services.ledger.sweep_as_of(today),
        None => state.services.ledger.sweep(),
    };
    for tx in &expired {
        persist(&state, tx).await?;
    }
    Ok(Json(SweepResponse {
        expired: expired.len(),
        transaction_ids: expired.iter().map(|tx| tx.transaction_id).collect(),
    }))
}
