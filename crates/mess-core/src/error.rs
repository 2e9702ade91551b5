//! # Error Types: Domain Error Taxonomy
//!
//! Every fallible operation in the ledger, pricing, menu, identity, and
//! redemption services returns [`MessError`]. The API layer maps each
//! variant to exactly one HTTP status.
//!
//! ## Design
//!
//! - Validation failures carry *every* violated field, not just the first.
//! - Unauthorized carries no detail so callers cannot learn which half of a
//!   credential pair was wrong.
//! - Nothing here is retryable; storage connectivity errors live in the API
//!   layer, not in this taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias for results carrying a [`MessError`].
pub type MessResult<T> = Result<T, MessError>;

/// Top-level domain error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessError {
    /// Malformed or missing input.
    #[error("validation error: {0}")]
    Validation(ValidationErrors),

    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness violation or an already-consumed redemption.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Credential mismatch.
    #[error("unauthorized: invalid email or credential")]
    Unauthorized,

    /// Operation attempted against an entity in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl MessError {
    /// Build a validation error with a single violation.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.push(field, message);
        Self::Validation(errors)
    }

    /// Short machine-readable kind, used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Unauthorized => "unauthorized",
            Self::InvalidState(_) => "invalid_state",
        }
    }
}

impl From<ValidationErrors> for MessError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

/// A single invalid input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Field name as the client sent it (camelCase).
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

/// Accumulator for field violations.
///
/// Validators push every problem they find and call
/// [`ValidationErrors::into_result`] once at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Record a "required" violation when `value` is `None`, passing the
    /// value through otherwise.
    pub fn require<T>(&mut self, field: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.push(field, "is required");
        }
        value
    }

    /// Merge another accumulator into this one.
    pub fn extend(&mut self, other: ValidationErrors) {
        self.violations.extend(other.violations);
    }

    /// Whether no violation has been recorded.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// All recorded violations, in the order they were found.
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Field names of all violations.
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for v in &self.violations {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{} {}", v.field, v.message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_accumulator_is_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn accumulator_keeps_every_violation() {
        let mut errors = ValidationErrors::new();
        errors.push("breakfastPrice", "must not be negative");
        errors.push("dinnerPrice.veg", "must not be negative");
        let err = errors.into_result().unwrap_err();
        assert_eq!(err.fields(), vec!["breakfastPrice", "dinnerPrice.veg"]);
        assert_eq!(
            err.to_string(),
            "breakfastPrice must not be negative; dinnerPrice.veg must not be negative"
        );
    }

    #[test]
    fn require_records_missing_values() {
        let mut errors = ValidationErrors::new();
        assert_eq!(errors.require("planType", Some(1)), Some(1));
        assert_eq!(errors.require::<u8>("startDate", None), None);
        assert_eq!(errors.fields(), vec!["startDate"]);
    }

    #[test]
    fn unauthorized_message_is_uniform() {
        assert_eq!(
            MessError::Unauthorized.to_string(),
            "unauthorized: invalid email or credential"
        );
    }

    #[test]
    fn error_kinds() {
        assert_eq!(MessError::invalid_field("x", "y").kind(), "validation");
        assert_eq!(MessError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(MessError::Conflict("x".into()).kind(), "conflict");
        assert_eq!(MessError::InvalidState("x".into()).kind(), "invalid_state");
    }
}
