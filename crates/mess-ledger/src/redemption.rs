//! # Redemption Desk
//!
//! Verifies a redemption token (or a student id) at the counter and marks
//! the meal consumed for today. Checks run in order and stop at the first
//! failure:
//!
//! 1. an active plan resolves → otherwise NotFound "no active plan"; a
//!    student id resolves to the plan covering today ahead of a later
//!    extension;
//! 2. today lies within the plan's dates → otherwise InvalidState;
//! 3. the plan includes the meal → otherwise InvalidState;
//! 4. the flag is claimed atomically → otherwise Conflict
//!    "already consumed today".
//!
//! "Today" is the UTC calendar day of the injected clock, for both
//! verification and status.

use std::sync::Arc;

use serde::Serialize;

use mess_core::{Clock, DateKey, MealType, MessError, MessResult, NumericId, RedemptionToken};
use mess_state::{DailyRedemption, Transaction};

use crate::ledger::Ledger;
use crate::store::Store;

/// Digits-only identifiers up to this length are student ids.
const MAX_STUDENT_ID_DIGITS: usize = 18;

/// What the desk scanned or typed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedemptionIdentifier {
    Token(RedemptionToken),
    Student(NumericId),
}

impl RedemptionIdentifier {
    /// A short run of digits is a student id; anything else is a token.
    pub fn parse(raw: &str) -> MessResult<Self> {
        let raw = raw.trim();
        if !raw.is_empty()
            && raw.len() <= MAX_STUDENT_ID_DIGITS
            && raw.bytes().all(|b| b.is_ascii_digit())
        {
            let id = raw
                .parse::<i64>()
                .map_err(|_| MessError::invalid_field("identifier", "is out of range"))?;
            return NumericId::new(id)
                .map(Self::Student)
                .map_err(|_| MessError::invalid_field("identifier", "must be a positive student id"));
        }
        RedemptionToken::new(raw)
            .map(Self::Token)
            .map_err(|_| MessError::invalid_field("identifier", "must be a token or a student id"))
    }
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionOutcome {
    pub meal_type: MealType,
    pub transaction: Transaction,
    pub redemption: DailyRedemption,
}

#[derive(Debug, Clone)]
pub struct RedemptionTracker {
    days: Store<(NumericId, DateKey), DailyRedemption>,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
}

impl RedemptionTracker {
    pub fn new(ledger: Ledger, clock: Arc<dyn Clock>) -> Self {
        Self {
            days: Store::new(),
            ledger,
            clock,
        }
    }

    /// Verify and consume one meal.
    pub fn verify(
        &self,
        identifier: &RedemptionIdentifier,
        meal: MealType,
    ) -> MessResult<RedemptionOutcome> {
        let transaction = match identifier {
            RedemptionIdentifier::Token(token) => self.ledger.find_by_token(token)?,
            RedemptionIdentifier::Student(id) => self.ledger.current_for_student(*id)?,
        };

        let today = self.clock.today();
        if !transaction.is_valid_on(today.date()) {
            return Err(MessError::InvalidState("plan not valid for current date".into()));
        }
        if !transaction.includes(meal) {
            return Err(MessError::InvalidState("meal not included in plan".into()));
        }

        let student = transaction.student_id;
        let redemption = self.days.write(|map| {
            let record = map
                .entry((student, today))
                .or_insert_with(|| DailyRedemption::new(student, today));
            record.claim(meal)?;
            Ok::<_, MessError>(record.clone())
        });
        let redemption = match redemption {
            Ok(r) => r,
            Err(err) => {
                tracing::info!(student_id = %student, meal = %meal, "duplicate redemption refused");
                return Err(err);
            }
        };

        tracing::info!(
            student_id = %student,
            transaction_id = %transaction.transaction_id,
            meal = %meal,
            date = %today,
            "meal redeemed"
        );
        Ok(RedemptionOutcome {
            meal_type: meal,
            transaction,
            redemption,
        })
    }

    /// Today's flags for a student. Never creates a record.
    pub fn status(&self, student: NumericId) -> DailyRedemption {
        let today = self.clock.today();
        self.days
            .get(&(student, today))
            .unwrap_or_else(|| DailyRedemption::new(student, today))
    }

    /// Per-meal redemption counts for a day.
    pub fn meal_counts(&self, day: DateKey) -> [(MealType, usize); 4] {
        self.days.read(|map| {
            MealType::ALL.map(|meal| {
                let n = map
                    .values()
                    .filter(|r| r.date_key == day && r.is_consumed(meal))
                    .count();
                (meal, n)
            })
        })
    }

    /// Load a persisted day record.
    pub fn restore(&self, record: DailyRedemption) {
        self.days.insert((record.student_id, record.date_key), record);
    }
}
