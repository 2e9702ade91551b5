//! # Transaction Lifecycle State Machine
//!
//! A transaction is one purchased meal plan. It carries two statuses:
//!
//! - **payment status**, moved by payment settlement;
//! - **lifecycle status**, derived from the payment status at creation and
//!   then moved by settlement side effects, cancellation, and expiry.
//!
//! ## Lifecycle
//!
//! ```text
//!             payment completed
//! Pending ───────────────────────▶ Active ──▶ Expired (terminal, endDate < today)
//!    │                               │
//!    ├──▶ Expired (terminal)         └──▶ Canceled (terminal)
//!    │
//!    └──▶ Canceled (terminal)
//! ```
//!
//! ## Payment
//!
//! ```text
//! Pending ──▶ Completed ──▶ Refunded (terminal)
//!    │
//!    └──▶ Failed (terminal)
//! ```
//!
//! Derivation at creation: `completed → active`, `pending | failed →
//! pending`, `refunded → canceled`. A refund cancels a live plan. Terminal
//! payment states freeze the payment; time-driven expiry still applies.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mess_core::{
    MealType, MealsIncluded, MessError, Money, NumericId, PlanType, RedemptionToken, TransactionId,
};

// ─── Payment Status ──────────────────────────────────────────────────

/// Settlement state of the money behind a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Whether no further payment transition is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Refunded)
    }

    /// Whether `self → target` is a legal settlement.
    pub fn can_settle_to(&self, target: PaymentStatus) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Completed)
                | (Self::Pending, Self::Failed)
                | (Self::Completed, Self::Refunded)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = MessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(MessError::invalid_field(
                "paymentStatus",
                format!("unknown payment status {other:?}"),
            )),
        }
    }
}

// ─── Lifecycle Status ────────────────────────────────────────────────

/// Lifecycle state of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    /// Awaiting payment completion.
    Pending,
    /// Paid and usable within its date range.
    Active,
    /// Past its end date (terminal).
    Expired,
    /// Canceled or refunded (terminal).
    Canceled,
}

impl LifecycleStatus {
    /// The lifecycle a new record starts in for a given payment status.
    pub fn from_payment(payment: PaymentStatus) -> Self {
        match payment {
            PaymentStatus::Completed => Self::Active,
            PaymentStatus::Pending | PaymentStatus::Failed => Self::Pending,
            PaymentStatus::Refunded => Self::Canceled,
        }
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleStatus {
    type Err = MessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            other => Err(MessError::invalid_field(
                "lifecycleStatus",
                format!("unknown lifecycle status {other:?}"),
            )),
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by lifecycle and payment transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// Lifecycle transition not allowed from the current state.
    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        from: LifecycleStatus,
        to: LifecycleStatus,
    },

    /// The plan is already expired or canceled.
    #[error("transaction is in terminal state {state}")]
    TerminalState { state: LifecycleStatus },

    /// Payment settlement not allowed from the current payment status.
    #[error("invalid payment transition: {from} -> {to}")]
    InvalidPayment {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// End date precedes start date.
    #[error("end date {end} is before start date {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}

impl From<TransactionError> for MessError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::InvalidDateRange { .. } => {
                MessError::invalid_field("endDate", "must not be before startDate")
            }
            other => MessError::InvalidState(other.to_string()),
        }
    }
}

// ─── Transition Log ──────────────────────────────────────────────────

/// One entry in a transaction's lifecycle log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleTransition {
    /// State before the transition; `None` for the creation entry.
    pub from: Option<LifecycleStatus>,
    /// State after the transition.
    pub to: LifecycleStatus,
    /// When the transition happened.
    pub at: DateTime<Utc>,
    /// Human-readable cause.
    pub reason: String,
}

// ─── Plan Terms ──────────────────────────────────────────────────────

/// Validated terms of a new plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanTerms {
    pub student_id: NumericId,
    pub plan_type: PlanType,
    pub meals_included: MealsIncluded,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub amount: Money,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
}

// ─── Transaction ─────────────────────────────────────────────────────

/// A purchased meal plan with its lifecycle state and transition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub student_id: NumericId,
    pub plan_type: PlanType,
    pub meals_included: MealsIncluded,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub amount: Money,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub lifecycle_status: LifecycleStatus,
    pub redemption_token: RedemptionToken,
    pub is_extension: bool,
    pub previous_transaction_id: Option<TransactionId>,
    pub transitions: Vec<LifecycleTransition>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Open a new transaction. `previous` links it as an extension.
    ///
    /// The lifecycle is derived from `terms.payment_status` and recorded as
    /// the first log entry.
    pub fn open(
        transaction_id: TransactionId,
        terms: PlanTerms,
        redemption_token: RedemptionToken,
        previous: Option<TransactionId>,
        now: DateTime<Utc>,
    ) -> Result<Self, TransactionError> {
        if terms.end_date < terms.start_date {
            return Err(TransactionError::InvalidDateRange {
                start: terms.start_date,
                end: terms.end_date,
            });
        }
        let lifecycle = LifecycleStatus::from_payment(terms.payment_status);
        let reason = if previous.is_some() {
            format!("extension opened with payment {}", terms.payment_status)
        } else {
            format!("purchased with payment {}", terms.payment_status)
        };
        Ok(Self {
            transaction_id,
            student_id: terms.student_id,
            plan_type: terms.plan_type,
            meals_included: terms.meals_included,
            start_date: terms.start_date,
            end_date: terms.end_date,
            amount: terms.amount,
            payment_status: terms.payment_status,
            payment_method: terms.payment_method,
            lifecycle_status: lifecycle,
            redemption_token,
            is_extension: previous.is_some(),
            previous_transaction_id: previous,
            transitions: vec![LifecycleTransition {
                from: None,
                to: lifecycle,
                at: now,
                reason,
            }],
            created_at: now,
        })
    }

    /// Settle the payment and apply its lifecycle side effect.
    ///
    /// Completion activates a pending plan. A refund cancels a live plan.
    /// An already-expired plan keeps its lifecycle status.
    pub fn settle_payment(
        &mut self,
        target: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TransactionError> {
        if !self.payment_status.can_settle_to(target) {
            return Err(TransactionError::InvalidPayment {
                from: self.payment_status,
                to: target,
            });
        }
        self.payment_status = target;
        match target {
            PaymentStatus::Completed if self.lifecycle_status == LifecycleStatus::Pending => {
                self.do_transition(LifecycleStatus::Active, "payment completed", now);
            }
            PaymentStatus::Refunded if !self.lifecycle_status.is_terminal() => {
                self.do_transition(LifecycleStatus::Canceled, "payment refunded", now);
            }
            _ => {}
        }
        Ok(())
    }

    /// Cancel the plan (ACTIVE or PENDING → CANCELED).
    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), TransactionError> {
        self.require_live(LifecycleStatus::Canceled)?;
        self.do_transition(LifecycleStatus::Canceled, reason, now);
        Ok(())
    }

    /// Expire the plan if its end date is before `today`.
    ///
    /// Returns whether a transition happened. Idempotent.
    pub fn expire_if_overdue(&mut self, today: NaiveDate, now: DateTime<Utc>) -> bool {
        if self.lifecycle_status.is_terminal() || self.end_date >= today {
            return false;
        }
        self.do_transition(
            LifecycleStatus::Expired,
            &format!("end date {} passed", self.end_date),
            now,
        );
        true
    }

    /// Whether `date` lies within `[start_date, end_date]`.
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Whether the plan is in the active lifecycle state.
    pub fn is_active(&self) -> bool {
        self.lifecycle_status == LifecycleStatus::Active
    }

    /// Whether the plan covers `meal`.
    pub fn includes(&self, meal: MealType) -> bool {
        self.meals_included.includes(meal)
    }

    /// Whether the plan can still change lifecycle state.
    pub fn is_terminal(&self) -> bool {
        self.lifecycle_status.is_terminal()
    }

    fn require_live(&self, target: LifecycleStatus) -> Result<(), TransactionError> {
        if self.lifecycle_status.is_terminal() {
            return Err(TransactionError::TerminalState {
                state: self.lifecycle_status,
            });
        }
        if !matches!(
            self.lifecycle_status,
            LifecycleStatus::Active | LifecycleStatus::Pending
        ) {
            return Err(TransactionError::InvalidTransition {
                from: self.lifecycle_status,
                to: target,
            });
        }
        Ok(())
    }

    fn do_transition(&mut self, to: LifecycleStatus, reason: &str, now: DateTime<Utc>) {
        self.transitions.push(LifecycleTransition {
            from: Some(self.lifecycle_status),
            to,
            at: now,
            reason: reason.to_string(),
        });
        self.lifecycle_status = to;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn payment() -> impl Strategy<Value = PaymentStatus> {
        prop_oneof![
            Just(PaymentStatus::Pending),
            Just(PaymentStatus::Completed),
            Just(PaymentStatus::Failed),
            Just(PaymentStatus::Refunded),
        ]
    }

    proptest! {
        #[test]
        fn terminal_lifecycle_is_absorbing(
            initial in payment(),
            settlements in proptest::collection::vec(payment(), 0..6),
            cancel_at in 0usize..8,
            day_offsets in proptest::collection::vec(0u64..20, 0..6),
        ) {
            let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
            let now = chrono::Utc::now();
            let mut tx = Transaction::open(
                TransactionId::new(),
                PlanTerms {
                    student_id: NumericId::new(7).unwrap(),
                    plan_type: PlanType::Weekly,
                    meals_included: MealsIncluded::default(),
                    start_date: start,
                    end_date: start + chrono::Days::new(6),
                    amount: Money::ZERO,
                    payment_method: "cash".into(),
                    payment_status: initial,
                },
                RedemptionToken::new("t").unwrap(),
                None,
                now,
            ).unwrap();

            let mut terminal_seen: Option<LifecycleStatus> = None;
            for (i, target) in settlements.iter().enumerate() {
                if i == cancel_at {
                    let _ = tx.cancel("prop", now);
                }
                let _ = tx.settle_payment(*target, now);
                if let Some(offset) = day_offsets.get(i) {
                    tx.expire_if_overdue(start + chrono::Days::new(*offset), now);
                }
                if let Some(state) = terminal_seen {
                    prop_assert_eq!(tx.lifecycle_status, state);
                } else if tx.is_terminal() {
                    terminal_seen = Some(tx.lifecycle_status);
                }
            }

            // Every log entry starts where the previous one ended.
            for pair in tx.transitions.windows(2) {
                prop_assert_eq!(pair[1].from, Some(pair[0].to));
            }
            prop_assert_eq!(tx.transitions.last().map(|t| t.to), Some(tx.lifecycle_status));
        }
    }
}
