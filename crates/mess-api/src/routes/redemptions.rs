//! # Redemption Desk API
//!
//! Staff scan a redemption token (or type a student id) and the meal is
//! marked consumed for today. With a database, the claim is also made
//! there with a conditional update, so two API processes cannot both
//! accept the same meal.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use mess_core::{MealType, ValidationErrors};
use mess_ledger::{RedemptionIdentifier, RedemptionOutcome};

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

/// Verification request.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Redemption token, or a student's numeric id.
    pub identifier: String,
    /// `breakfast`, `lunch`, `snacks` or `dinner`.
    pub meal_type: String,
}

impl Validate for VerifyRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.identifier.trim().is_empty() {
            errors.push("identifier", "is required");
        }
        if self.meal_type.parse::<MealType>().is_err() {
            errors.push("mealType", "must be breakfast, lunch, snacks or dinner");
        }
        errors.into_result()
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/redemptions/verify", post(verify))
}

/// POST /v1/redemptions/verify
#[utoipa::path(
    post,
    path = "/v1/redemptions/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Meal redeemed"),
        (status = 404, description = "No active plan", body = crate::error::ErrorBody),
        (status = 409, description = "Already consumed today", body = crate::error::ErrorBody),
        (status = 422, description = "Plan not valid today or meal not included", body = crate::error::ErrorBody),
    ),
    tag = "redemptions"
)]
pub async fn verify(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<RedemptionOutcome>, AppError> {
    require_role(&caller, Role::MessStaff)?;
    let req = extract_validated_json(body)?;
    let meal: MealType = req.meal_type.parse()?;
    let identifier = RedemptionIdentifier::parse(&req.identifier)?;

    let outcome = match state.services.redemptions.verify(&identifier, meal) {
        Ok(outcome) => outcome,
        Err(err) => {
            metrics::counter!("mess_redemptions_refused_total", "meal" => meal.as_str())
                .increment(1);
            return Err(err.into());
        }
    };

    if let Some(pool) = &state.db_pool {
        let redemption = &outcome.redemption;
        let claimed = crate::db::redemptions::claim(pool, redemption.student_id, redemption.date_key, meal)
            .await
            .map_err(|e| crate::db::write_failed("redemption", e))?;
        if !claimed {
            tracing::info!(student_id = %redemption.student_id, meal = %meal, "redemption already claimed in database");
            return Err(AppError::Conflict("already consumed today".into()));
        }
    }

    metrics::counter!("mess_redemptions_total", "meal" => meal.as_str()).increment(1);
    Ok(Json(outcome))
}
