//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs, helpers to extract and
//! validate JSON bodies and query strings in handlers, and parsers for path
//! segments that report bad input as structured validation errors.

use std::str::FromStr;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;
use uuid::Uuid;

use mess_core::{
    DayKey, MessError, NumericId, PriceSheetId, PrincipalKind, TransactionId, ValidationErrors,
};

use crate::error::AppError;

/// Request types that check business rules beyond what serde enforces.
pub trait Validate {
    /// Report every violated field.
    fn validate(&self) -> Result<(), ValidationErrors>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
///
/// ```ignore
/// async fn handler(body: Result<Json<T>, JsonRejection>) -> Result<..., AppError> {
///     let req = extract_json(body)?;
/// }
/// ```
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate()?;
    Ok(value)
}

/// Extract a query string, mapping rejections to [`AppError::BadRequest`].
pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

pub fn parse_kind(raw: &str) -> Result<PrincipalKind, AppError> {
    PrincipalKind::from_str(raw).map_err(AppError::from)
}

pub fn parse_numeric_id(raw: &str) -> Result<NumericId, AppError> {
    NumericId::from_str(raw).map_err(AppError::from)
}

pub fn parse_day(raw: &str) -> Result<DayKey, AppError> {
    DayKey::from_str(raw).map_err(AppError::from)
}

pub fn parse_transaction_id(raw: &str) -> Result<TransactionId, AppError> {
    Uuid::parse_str(raw.trim())
        .map(TransactionId)
        .map_err(|_| MessError::invalid_field("transactionId", "must be a UUID").into())
}

pub fn parse_price_sheet_id(raw: &str) -> Result<PriceSheetId, AppError> {
    Uuid::parse_str(raw.trim())
        .map(PriceSheetId)
        .map_err(|_| MessError::invalid_field("id", "must be a UUID").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_parsers_report_fields() {
        assert_eq!(parse_kind("students").unwrap(), PrincipalKind::Student);
        assert_eq!(parse_day("mon").unwrap(), DayKey::Mon);
        assert_eq!(parse_numeric_id("101").unwrap().value(), 101);

        let Err(AppError::Validation(errors)) = parse_transaction_id("not-a-uuid") else {
            panic!("expected validation error");
        };
        assert_eq!(errors.fields(), vec!["transactionId"]);
        assert!(matches!(parse_kind("janitor"), Err(AppError::Validation(_))));
        assert!(matches!(parse_numeric_id("-4"), Err(AppError::Validation(_))));
    }
}
