//! # Daily Redemption Flags
//!
//! One [`DailyRedemption`] per `(studentId, dateKey)`. It is created lazily
//! on the first redemption of the day, and each meal flag moves from
//! `false` to `true` at most once. There is no reset: the next UTC day gets
//! a fresh record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mess_core::{DateKey, MealType, MessError, NumericId};

/// Errors raised when claiming a meal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedemptionError {
    /// The meal was already redeemed on this day.
    #[error("{meal} already consumed today")]
    AlreadyConsumed { meal: MealType },
}

impl From<RedemptionError> for MessError {
    fn from(_: RedemptionError) -> Self {
        MessError::Conflict("already consumed today".to_string())
    }
}

/// Meals consumed by one student on one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRedemption {
    pub student_id: NumericId,
    pub date_key: DateKey,
    pub breakfast: bool,
    pub lunch: bool,
    pub snacks: bool,
    pub dinner: bool,
}

impl DailyRedemption {
    /// An all-false record.
    pub fn new(student_id: NumericId, date_key: DateKey) -> Self {
        Self {
            student_id,
            date_key,
            breakfast: false,
            lunch: false,
            snacks: false,
            dinner: false,
        }
    }

    /// Whether `meal` has been redeemed.
    pub fn is_consumed(&self, meal: MealType) -> bool {
        match meal {
            MealType::Breakfast => self.breakfast,
            MealType::Lunch => self.lunch,
            MealType::Snacks => self.snacks,
            MealType::Dinner => self.dinner,
        }
    }

    /// Set the flag for `meal` if it is still unset.
    pub fn claim(&mut self, meal: MealType) -> Result<(), RedemptionError> {
        let flag = match meal {
            MealType::Breakfast => &mut self.breakfast,
            MealType::Lunch => &mut self.lunch,
            MealType::Snacks => &mut self.snacks,
            MealType::Dinner => &mut self.dinner,
        };
        if *flag {
            return Err(RedemptionError::AlreadyConsumed { meal });
        }
        *flag = true;
        Ok(())
    }

    /// Meals redeemed so far, in serving order.
    pub fn consumed(&self) -> Vec<MealType> {
        MealType::ALL
            .into_iter()
            .filter(|m| self.is_consumed(*m))
            .collect()
    }
}
