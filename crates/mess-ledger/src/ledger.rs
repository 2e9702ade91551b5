//! # Transaction Ledger
//!
//! Every purchased plan, indexed three ways under one lock:
//!
//! - by transaction id;
//! - by redemption token (globally unique);
//! - by predecessor, for the one-successor-per-predecessor rule.
//!
//! ## Sweeping
//!
//! Expiry is time-driven. Reads that answer "what is active" first sweep
//! the records they are about to inspect, inside the same write lock, so a
//! plan whose end date has passed is never reported as active. A full
//! sweep ([`Ledger::sweep`]) also runs periodically in the background.
//!
//! ## Extensions
//!
//! An extension resolves its predecessor as the explicit
//! `previousTransactionId` when given, otherwise the student's active plan
//! with the latest end date. The new plan starts on the predecessor's end
//! date.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::Deserialize;

use mess_core::{
    Clock, MealsIncluded, MessError, MessResult, Money, NumericId, PlanType, RedemptionToken,
    TransactionId, ValidationErrors,
};
use mess_crypto::TokenSource;
use mess_state::{LifecycleStatus, PaymentStatus, PlanTerms, Transaction};

/// Attempts at minting an unused redemption token before giving up.
pub const MAX_TOKEN_ATTEMPTS: usize = 8;

/// Existence check for the student a plan is bought for.
pub trait StudentDirectory: Send + Sync + std::fmt::Debug {
    fn student_exists(&self, id: NumericId) -> bool;
}

// ─── Requests ────────────────────────────────────────────────────────

/// Raw purchase input. Enum and date fields are strings so that bad
/// values are reported as field violations alongside missing ones.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub student_id: Option<i64>,
    pub plan_type: Option<String>,
    pub meals_included: Option<MealsIncluded>,
    pub start_date: Option<String>,
    /// Defaults to the plan's nominal length from `startDate`.
    pub end_date: Option<String>,
    pub amount: Option<i64>,
    pub payment_method: Option<String>,
    /// Defaults to `pending`.
    pub payment_status: Option<String>,
}

impl PurchaseRequest {
    fn validate(&self) -> Result<PlanTerms, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let student_id = student_field(self.student_id, &mut errors);
        let plan_type = parsed::<PlanType>("planType", self.plan_type.as_deref(), true, &mut errors);
        let meals = meals_field(self.meals_included, &mut errors);
        let start = date_field("startDate", self.start_date.as_deref(), true, &mut errors);
        let end = date_field("endDate", self.end_date.as_deref(), false, &mut errors);
        let amount = amount_field(self.amount, &mut errors);
        let method = method_field(self.payment_method.as_deref(), &mut errors);
        let payment =
            parsed::<PaymentStatus>("paymentStatus", self.payment_status.as_deref(), false, &mut errors)
                .unwrap_or(PaymentStatus::Pending);

        let end = match (plan_type, start, end) {
            (_, _, Some(end)) => Some(end),
            (Some(plan), Some(start), None) => {
                let end = plan.default_end_date(start);
                if end.is_none() {
                    errors.push("endDate", "is out of range");
                }
                end
            }
            _ => None,
        };
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                errors.push("endDate", "must not be before startDate");
            }
        }
        errors.into_result()?;

        match (student_id, plan_type, meals, start, end, amount, method) {
            (Some(student_id), Some(plan_type), Some(meals_included), Some(start_date), Some(end_date), Some(amount), Some(payment_method)) => {
                Ok(PlanTerms {
                    student_id,
                    plan_type,
                    meals_included,
                    start_date,
                    end_date,
                    amount,
                    payment_method,
                    payment_status: payment,
                })
            }
            _ => {
                let mut errors = ValidationErrors::new();
                errors.push("body", "incomplete purchase");
                Err(errors)
            }
        }
    }
}

/// Raw extension input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendRequest {
    pub student_id: Option<i64>,
    /// Explicit predecessor. When absent, the student's latest active plan.
    pub previous_transaction_id: Option<TransactionId>,
    /// Optional guard: must equal the predecessor's end date.
    pub current_end_date: Option<String>,
    pub plan_type: Option<String>,
    /// Defaults to the predecessor's meals.
    pub meals_included: Option<MealsIncluded>,
    /// Defaults to the plan's nominal length past the predecessor's end.
    pub end_date: Option<String>,
    pub amount: Option<i64>,
    pub payment_method: Option<String>,
    /// Defaults to `pending`.
    pub payment_status: Option<String>,
}

struct CheckedExtension {
    student_id: NumericId,
    previous: Option<TransactionId>,
    current_end_date: Option<NaiveDate>,
    plan_type: PlanType,
    meals_included: Option<MealsIncluded>,
    end_date: Option<NaiveDate>,
    amount: Money,
    payment_method: String,
    payment_status: PaymentStatus,
}

impl ExtendRequest {
    fn validate(&self) -> Result<CheckedExtension, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let student_id = student_field(self.student_id, &mut errors);
        let current_end_date =
            date_field("currentEndDate", self.current_end_date.as_deref(), false, &mut errors);
        let plan_type = parsed::<PlanType>("planType", self.plan_type.as_deref(), true, &mut errors);
        if let Some(meals) = self.meals_included {
            if !meals.any() {
                errors.push("mealsIncluded", "must include at least one meal");
            }
        }
        let end_date = date_field("endDate", self.end_date.as_deref(), false, &mut errors);
        let amount = amount_field(self.amount, &mut errors);
        let method = method_field(self.payment_method.as_deref(), &mut errors);
        let payment =
            parsed::<PaymentStatus>("paymentStatus", self.payment_status.as_deref(), false, &mut errors)
                .unwrap_or(PaymentStatus::Pending);
        errors.into_result()?;

        match (student_id, plan_type, amount, method) {
            (Some(student_id), Some(plan_type), Some(amount), Some(payment_method)) => {
                Ok(CheckedExtension {
                    student_id,
                    previous: self.previous_transaction_id,
                    current_end_date,
                    plan_type,
                    meals_included: self.meals_included,
                    end_date,
                    amount,
                    payment_method,
                    payment_status: payment,
                })
            }
            _ => {
                let mut errors = ValidationErrors::new();
                errors.push("body", "incomplete extension");
                Err(errors)
            }
        }
    }
}

fn student_field(value: Option<i64>, errors: &mut ValidationErrors) -> Option<NumericId> {
    let raw = errors.require("studentId", value)?;
    match NumericId::new(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            errors.push("studentId", "must be a positive integer");
            None
        }
    }
}

fn meals_field(value: Option<MealsIncluded>, errors: &mut ValidationErrors) -> Option<MealsIncluded> {
    let meals = errors.require("mealsIncluded", value)?;
    if !meals.any() {
        errors.push("mealsIncluded", "must include at least one meal");
        return None;
    }
    Some(meals)
}

fn amount_field(value: Option<i64>, errors: &mut ValidationErrors) -> Option<Money> {
    let raw = errors.require("amount", value)?;
    if raw < 0 {
        errors.push("amount", "must not be negative");
        return None;
    }
    Money::new(raw).ok()
}

fn method_field(value: Option<&str>, errors: &mut ValidationErrors) -> Option<String> {
    let raw = errors.require("paymentMethod", value)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        errors.push("paymentMethod", "must not be blank");
        return None;
    }
    Some(trimmed.to_string())
}

fn parsed<T: FromStr>(
    field: &str,
    value: Option<&str>,
    required: bool,
    errors: &mut ValidationErrors,
) -> Option<T> {
    let raw = match value {
        Some(raw) => raw,
        None if required => {
            errors.push(field, "is required");
            return None;
        }
        None => return None,
    };
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            errors.push(field, format!("has unknown value {raw:?}"));
            None
        }
    }
}

fn date_field(
    field: &str,
    value: Option<&str>,
    required: bool,
    errors: &mut ValidationErrors,
) -> Option<NaiveDate> {
    let raw = match value {
        Some(raw) => raw,
        None if required => {
            errors.push(field, "is required");
            return None;
        }
        None => return None,
    };
    match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        Ok(d) => Some(d),
        Err(_) => {
            errors.push(field, "must be a YYYY-MM-DD date");
            None
        }
    }
}

// ─── Book ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct LedgerBook {
    by_id: HashMap<TransactionId, Transaction>,
    by_token: HashMap<RedemptionToken, TransactionId>,
    successor_of: HashMap<TransactionId, TransactionId>,
}

impl LedgerBook {
    fn insert(&mut self, tx: Transaction) {
        self.by_token
            .insert(tx.redemption_token.clone(), tx.transaction_id);
        if let Some(prev) = tx.previous_transaction_id {
            self.successor_of.insert(prev, tx.transaction_id);
        }
        self.by_id.insert(tx.transaction_id, tx);
    }

    fn mint_token(&self, tokens: &dyn TokenSource) -> MessResult<RedemptionToken> {
        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let candidate = tokens.mint();
            if !self.by_token.contains_key(&candidate) {
                return Ok(candidate);
            }
            tracing::warn!(attempt, "redemption token collision, retrying");
        }
        Err(MessError::Conflict(
            "could not mint a unique redemption token".into(),
        ))
    }

    fn sweep_where(
        &mut self,
        today: NaiveDate,
        now: DateTime<Utc>,
        pred: impl Fn(&Transaction) -> bool,
    ) -> Vec<Transaction> {
        self.by_id
            .values_mut()
            .filter(|tx| pred(tx))
            .filter_map(|tx| tx.expire_if_overdue(today, now).then(|| tx.clone()))
            .collect()
    }

    fn latest_active(&self, student: NumericId) -> Option<&Transaction> {
        self.by_id
            .values()
            .filter(|tx| tx.student_id == student && tx.is_active())
            .max_by_key(|tx| (tx.end_date, tx.created_at))
    }

    fn latest_active_on(&self, student: NumericId, day: NaiveDate) -> Option<&Transaction> {
        self.by_id
            .values()
            .filter(|tx| tx.student_id == student && tx.is_active() && tx.is_valid_on(day))
            .max_by_key(|tx| (tx.end_date, tx.created_at))
    }
}

// ─── Ledger ──────────────────────────────────────────────────────────

/// Aggregate lifecycle counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub pending: usize,
    pub active: usize,
    pub expired: usize,
    pub canceled: usize,
    /// Sum of amounts whose payment is completed.
    pub completed_revenue: i64,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    book: Arc<RwLock<LedgerBook>>,
    students: Arc<dyn StudentDirectory>,
    tokens: Arc<dyn TokenSource>,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    pub fn new(
        students: Arc<dyn StudentDirectory>,
        tokens: Arc<dyn TokenSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            book: Arc::new(RwLock::new(LedgerBook::default())),
            students,
            tokens,
            clock,
        }
    }

    fn today(&self) -> NaiveDate {
        self.clock.today().date()
    }

    /// Record a new plan purchase.
    pub fn purchase(&self, request: PurchaseRequest) -> MessResult<Transaction> {
        let terms = request.validate()?;
        if !self.students.student_exists(terms.student_id) {
            return Err(MessError::invalid_field(
                "studentId",
                "does not reference an existing student",
            ));
        }
        let now = self.clock.now();
        let tx = {
            let mut book = self.book.write();
            let token = book.mint_token(self.tokens.as_ref())?;
            let tx = Transaction::open(TransactionId::new(), terms, token, None, now)?;
            book.insert(tx.clone());
            tx
        };
        tracing::info!(
            transaction_id = %tx.transaction_id,
            student_id = %tx.student_id,
            plan_type = %tx.plan_type,
            lifecycle = %tx.lifecycle_status,
            "plan purchased"
        );
        Ok(tx)
    }

    /// Extend a student's plan with a new linked transaction.
    pub fn extend(&self, request: ExtendRequest) -> MessResult<Transaction> {
        let req = request.validate()?;
        let today = self.today();
        let now = self.clock.now();

        let tx = {
            let mut book = self.book.write();
            book.sweep_where(today, now, |tx| tx.student_id == req.student_id);

            let predecessor = match req.previous {
                Some(id) => book
                    .by_id
                    .get(&id)
                    .filter(|tx| tx.student_id == req.student_id && tx.is_active()),
                None => book.latest_active(req.student_id),
            }
            .ok_or_else(|| MessError::NotFound("no active plan to extend".into()))?;

            if let Some(expected) = req.current_end_date {
                if expected != predecessor.end_date {
                    return Err(MessError::NotFound(format!(
                        "no active plan ending on {expected}"
                    )));
                }
            }
            if book.successor_of.contains_key(&predecessor.transaction_id) {
                return Err(MessError::Conflict(format!(
                    "transaction {} has already been extended",
                    predecessor.transaction_id
                )));
            }

            let start_date = predecessor.end_date;
            let end_date = match req.end_date {
                Some(end) => end,
                None => start_date
                    .checked_add_days(Days::new(req.plan_type.nominal_days()))
                    .ok_or_else(|| MessError::invalid_field("endDate", "is out of range"))?,
            };
            if end_date < start_date {
                return Err(MessError::invalid_field(
                    "endDate",
                    "must not be before the current plan's end date",
                ));
            }
            let predecessor_id = predecessor.transaction_id;
            let terms = PlanTerms {
                student_id: req.student_id,
                plan_type: req.plan_type,
                meals_included: req.meals_included.unwrap_or(predecessor.meals_included),
                start_date,
                end_date,
                amount: req.amount,
                payment_method: req.payment_method,
                payment_status: req.payment_status,
            };

            let token = book.mint_token(self.tokens.as_ref())?;
            let tx = Transaction::open(TransactionId::new(), terms, token, Some(predecessor_id), now)?;
            book.insert(tx.clone());
            tx
        };
        tracing::info!(
            transaction_id = %tx.transaction_id,
            previous = ?tx.previous_transaction_id,
            student_id = %tx.student_id,
            end_date = %tx.end_date,
            "plan extended"
        );
        Ok(tx)
    }

    /// Settle the payment of a transaction.
    pub fn settle_payment(&self, id: TransactionId, status: PaymentStatus) -> MessResult<Transaction> {
        let today = self.today();
        let now = self.clock.now();
        let tx = {
            let mut book = self.book.write();
            let tx = book
                .by_id
                .get_mut(&id)
                .ok_or_else(|| MessError::NotFound(format!("transaction {id}")))?;
            tx.expire_if_overdue(today, now);
            tx.settle_payment(status, now)?;
            tx.clone()
        };
        tracing::info!(transaction_id = %id, payment = %status, lifecycle = %tx.lifecycle_status, "payment settled");
        Ok(tx)
    }

    /// Cancel a live transaction.
    pub fn cancel(&self, id: TransactionId, reason: &str) -> MessResult<Transaction> {
        let today = self.today();
        let now = self.clock.now();
        let tx = {
            let mut book = self.book.write();
            let tx = book
                .by_id
                .get_mut(&id)
                .ok_or_else(|| MessError::NotFound(format!("transaction {id}")))?;
            tx.expire_if_overdue(today, now);
            tx.cancel(reason, now)?;
            tx.clone()
        };
        tracing::info!(transaction_id = %id, reason, "plan canceled");
        Ok(tx)
    }

    /// Expire every overdue plan. Returns the records that changed.
    pub fn sweep(&self) -> Vec<Transaction> {
        self.sweep_as_of(self.today())
    }

    /// Expire every plan whose end date is before `today`.
    pub fn sweep_as_of(&self, today: NaiveDate) -> Vec<Transaction> {
        let now = self.clock.now();
        let expired = self.book.write().sweep_where(today, now, |_| true);
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), today = %today, "expired overdue plans");
        }
        expired
    }

    pub fn get(&self, id: TransactionId) -> MessResult<Transaction> {
        self.book
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| MessError::NotFound(format!("transaction {id}")))
    }

    /// The student's active plan with the latest end date.
    pub fn active_for_student(&self, student: NumericId) -> MessResult<Transaction> {
        let today = self.today();
        let now = self.clock.now();
        let mut book = self.book.write();
        book.sweep_where(today, now, |tx| tx.student_id == student);
        book.latest_active(student)
            .cloned()
            .ok_or_else(|| MessError::NotFound("no active plan".into()))
    }

    /// The active plan covering today, for redemption by student id.
    ///
    /// Falls back to the latest active plan when none covers today, so the
    /// caller's date check can report it.
    pub fn current_for_student(&self, student: NumericId) -> MessResult<Transaction> {
        let today = self.today();
        let now = self.clock.now();
        let mut book = self.book.write();
        book.sweep_where(today, now, |tx| tx.student_id == student);
        book.latest_active_on(student, today)
            .or_else(|| book.latest_active(student))
            .cloned()
            .ok_or_else(|| MessError::NotFound("no active plan".into()))
    }

    /// Every plan of the student, newest first.
    pub fn history_for_student(&self, student: NumericId) -> Vec<Transaction> {
        let today = self.today();
        let now = self.clock.now();
        let mut book = self.book.write();
        book.sweep_where(today, now, |tx| tx.student_id == student);
        let mut all: Vec<Transaction> = book
            .by_id
            .values()
            .filter(|tx| tx.student_id == student)
            .cloned()
            .collect();
        all.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.start_date.cmp(&a.start_date))
        });
        all
    }

    /// The active plan carrying `token`.
    pub fn find_by_token(&self, token: &RedemptionToken) -> MessResult<Transaction> {
        let today = self.today();
        let now = self.clock.now();
        let mut book = self.book.write();
        let id = book
            .by_token
            .get(token)
            .copied()
            .ok_or_else(|| MessError::NotFound("no active plan".into()))?;
        let tx = book
            .by_id
            .get_mut(&id)
            .ok_or_else(|| MessError::NotFound("no active plan".into()))?;
        tx.expire_if_overdue(today, now);
        if !tx.is_active() {
            return Err(MessError::NotFound("no active plan".into()));
        }
        Ok(tx.clone())
    }

    /// The extension chain ending at `id`, tip first.
    pub fn chain(&self, id: TransactionId) -> MessResult<Vec<Transaction>> {
        let book = self.book.read();
        let start = book
            .by_id
            .get(&id)
            .ok_or_else(|| MessError::NotFound(format!("transaction {id}")))?;
        let chain = mess_state::walk(start, |prev| book.by_id.get(prev))?;
        Ok(chain.into_iter().cloned().collect())
    }

    /// Every transaction, in no particular order.
    pub fn list_all(&self) -> Vec<Transaction> {
        self.book.read().by_id.values().cloned().collect()
    }

    pub fn counts(&self) -> LedgerCounts {
        let book = self.book.read();
        let mut counts = LedgerCounts::default();
        for tx in book.by_id.values() {
            match tx.lifecycle_status {
                LifecycleStatus::Pending => counts.pending += 1,
                LifecycleStatus::Active => counts.active += 1,
                LifecycleStatus::Expired => counts.expired += 1,
                LifecycleStatus::Canceled => counts.canceled += 1,
            }
            if tx.payment_status == PaymentStatus::Completed {
                counts.completed_revenue += tx.amount.minor_units();
            }
        }
        counts
    }

    /// Load a persisted transaction without re-validating it.
    pub fn restore(&self, tx: Transaction) {
        self.book.write().insert(tx);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use chrono::Duration;
    use mess_core::ManualClock;
    use mess_crypto::{RandomTokenSource, ScriptedTokenSource};

    #[derive(Debug)]
    struct Roster(HashSet<i64>);

    impl StudentDirectory for Roster {
        fn student_exists(&self, id: NumericId) -> bool {
            self.0.contains(&id.value())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ledger_with(tokens: Arc<dyn TokenSource>) -> (Ledger, ManualClock) {
        let clock = ManualClock::at_noon(date(2025, 1, 1));
        let ledger = Ledger::new(
            Arc::new(Roster([101, 102].into_iter().collect())),
            tokens,
            Arc::new(clock.clone()),
        );
        (ledger, clock)
    }

    fn ledger() -> (Ledger, ManualClock) {
        ledger_with(Arc::new(RandomTokenSource))
    }

    fn weekly(student: i64) -> PurchaseRequest {
        PurchaseRequest {
            student_id: Some(student),
            plan_type: Some("weekly".into()),
            meals_included: Some(MealsIncluded {
                breakfast: true,
                lunch: true,
                dinner: false,
                snacks: false,
            }),
            start_date: Some("2025-01-01".into()),
            end_date: Some("2025-01-07".into()),
            amount: Some(70_000),
            payment_method: Some("upi".into()),
            payment_status: Some("completed".into()),
        }
    }

    fn extension(student: i64) -> ExtendRequest {
        ExtendRequest {
            student_id: Some(student),
            plan_type: Some("weekly".into()),
            amount: Some(70_000),
            payment_method: Some("upi".into()),
            payment_status: Some("completed".into()),
            ..Default::default()
        }
    }

    fn sid(id: i64) -> NumericId {
        NumericId::new(id).unwrap()
    }

    // ── Purchase ─────────────────────────────────────────────────────

    #[test]
    fn completed_weekly_purchase_is_active_with_token() {
        let (ledger, _) = ledger();
        let tx = ledger.purchase(weekly(101)).unwrap();
        assert_eq!(tx.lifecycle_status, LifecycleStatus::Active);
        assert_eq!(tx.redemption_token.as_str().len(), 64);
        assert_eq!(ledger.find_by_token(&tx.redemption_token).unwrap(), tx);
        assert_eq!(ledger.active_for_student(sid(101)).unwrap(), tx);
    }

    #[test]
    fn purchase_reports_every_missing_field() {
        let (ledger, _) = ledger();
        let err = ledger.purchase(PurchaseRequest::default()).unwrap_err();
        let MessError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            errors.fields(),
            vec!["studentId", "planType", "mealsIncluded", "startDate", "amount", "paymentMethod"]
        );
    }

    #[test]
    fn purchase_rejects_reversed_dates_and_negative_amount() {
        let (ledger, _) = ledger();
        let mut req = weekly(101);
        req.end_date = Some("2024-12-31".into());
        req.amount = Some(-5);
        let MessError::Validation(errors) = ledger.purchase(req).unwrap_err() else {
            panic!("expected validation error");
        };
        assert_eq!(errors.fields(), vec!["amount", "endDate"]);
    }

    #[test]
    fn purchase_requires_existing_student() {
        let (ledger, _) = ledger();
        let MessError::Validation(errors) = ledger.purchase(weekly(999)).unwrap_err() else {
            panic!("expected validation error");
        };
        assert_eq!(errors.fields(), vec!["studentId"]);
    }

    #[test]
    fn end_date_defaults_to_plan_length() {
        let (ledger, _) = ledger();
        let mut req = weekly(101);
        req.end_date = None;
        req.plan_type = Some("monthly".into());
        let tx = ledger.purchase(req).unwrap();
        assert_eq!(tx.end_date, date(2025, 1, 30));
    }

    #[test]
    fn pending_purchase_activates_on_payment() {
        let (ledger, _) = ledger();
        let mut req = weekly(101);
        req.payment_status = None;
        let tx = ledger.purchase(req).unwrap();
        assert_eq!(tx.lifecycle_status, LifecycleStatus::Pending);
        assert!(ledger.find_by_token(&tx.redemption_token).is_err());

        let settled = ledger
            .settle_payment(tx.transaction_id, PaymentStatus::Completed)
            .unwrap();
        assert_eq!(settled.lifecycle_status, LifecycleStatus::Active);
        assert!(ledger.find_by_token(&tx.redemption_token).is_ok());
    }

    #[test]
    fn token_collision_is_retried() {
        let fixed = RedemptionToken::new("collide").unwrap();
        let (ledger, _) = ledger_with(Arc::new(ScriptedTokenSource::new([
            fixed.clone(),
            fixed.clone(),
            fixed.clone(),
        ])));
        let first = ledger.purchase(weekly(101)).unwrap();
        let second = ledger.purchase(weekly(102)).unwrap();
        assert_eq!(first.redemption_token, fixed);
        assert_ne!(second.redemption_token, fixed);
    }

    #[test]
    fn exhausted_token_attempts_conflict() {
        let fixed = RedemptionToken::new("collide").unwrap();
        let script = std::iter::repeat(fixed).take(MAX_TOKEN_ATTEMPTS + 1);
        let (ledger, _) = ledger_with(Arc::new(ScriptedTokenSource::new(script)));
        ledger.purchase(weekly(101)).unwrap();
        assert!(matches!(
            ledger.purchase(weekly(102)),
            Err(MessError::Conflict(_))
        ));
    }

    #[test]
    fn tokens_are_unique_across_many_purchases() {
        let (ledger, _) = ledger();
        for _ in 0..200 {
            ledger.purchase(weekly(101)).unwrap();
        }
        let tokens: HashSet<_> = ledger
            .list_all()
            .into_iter()
            .map(|t| t.redemption_token)
            .collect();
        assert_eq!(tokens.len(), 200);
    }

    // ── Sweep ────────────────────────────────────────────────────────

    #[test]
    fn sweep_expires_after_end_date_and_is_idempotent() {
        let (ledger, clock) = ledger();
        let tx = ledger.purchase(weekly(101)).unwrap();

        clock.set(date(2025, 1, 7).and_hms_opt(23, 59, 0).unwrap().and_utc());
        assert!(ledger.sweep().is_empty());
        assert!(ledger.find_by_token(&tx.redemption_token).is_ok());

        clock.advance(Duration::minutes(2));
        let expired = ledger.sweep();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].lifecycle_status, LifecycleStatus::Expired);
        assert!(ledger.sweep().is_empty());
        assert_eq!(ledger.counts().expired, 1);
    }

    #[test]
    fn reads_sweep_inline() {
        let (ledger, clock) = ledger();
        let tx = ledger.purchase(weekly(101)).unwrap();
        clock.advance(Duration::days(7));
        assert!(matches!(
            ledger.find_by_token(&tx.redemption_token),
            Err(MessError::NotFound(_))
        ));
        assert!(ledger.active_for_student(sid(101)).is_err());
        let history = ledger.history_for_student(sid(101));
        assert_eq!(history[0].lifecycle_status, LifecycleStatus::Expired);
    }

    #[test]
    fn past_dated_purchase_expires_on_next_read() {
        let (ledger, _) = ledger();
        let mut req = weekly(101);
        req.start_date = Some("2024-12-01".into());
        req.end_date = Some("2024-12-07".into());
        let tx = ledger.purchase(req).unwrap();
        assert_eq!(tx.lifecycle_status, LifecycleStatus::Active);
        let history = ledger.history_for_student(sid(101));
        assert_eq!(history[0].lifecycle_status, LifecycleStatus::Expired);
    }

    // ── Extend ───────────────────────────────────────────────────────

    #[test]
    fn extend_links_latest_active_plan() {
        let (ledger, _) = ledger();
        let base = ledger.purchase(weekly(101)).unwrap();
        let ext = ledger.extend(extension(101)).unwrap();
        assert!(ext.is_extension);
        assert_eq!(ext.previous_transaction_id, Some(base.transaction_id));
        assert_eq!(ext.start_date, base.end_date);
        assert_eq!(ext.end_date, date(2025, 1, 14));
        assert_eq!(ext.meals_included, base.meals_included);

        let chain = ledger.chain(ext.transaction_id).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].transaction_id, base.transaction_id);
    }

    #[test]
    fn extending_twice_extends_the_newest_plan() {
        let (ledger, _) = ledger();
        ledger.purchase(weekly(101)).unwrap();
        let first = ledger.extend(extension(101)).unwrap();
        let second = ledger.extend(extension(101)).unwrap();
        assert_eq!(second.previous_transaction_id, Some(first.transaction_id));
        assert_eq!(ledger.chain(second.transaction_id).unwrap().len(), 3);
        assert!(mess_state::audit(&ledger.list_all()).is_empty());
    }

    #[test]
    fn explicit_predecessor_cannot_be_extended_twice() {
        let (ledger, _) = ledger();
        let base = ledger.purchase(weekly(101)).unwrap();
        let mut req = extension(101);
        req.previous_transaction_id = Some(base.transaction_id);
        ledger.extend(req.clone()).unwrap();
        assert!(matches!(ledger.extend(req), Err(MessError::Conflict(_))));
    }

    #[test]
    fn extend_end_date_guard() {
        let (ledger, _) = ledger();
        ledger.purchase(weekly(101)).unwrap();
        let mut req = extension(101);
        req.current_end_date = Some("2025-01-06".into());
        assert!(matches!(ledger.extend(req.clone()), Err(MessError::NotFound(_))));
        req.current_end_date = Some("2025-01-07".into());
        assert!(ledger.extend(req).is_ok());
    }

    #[test]
    fn extend_without_active_plan_is_not_found() {
        let (ledger, clock) = ledger();
        assert!(matches!(ledger.extend(extension(101)), Err(MessError::NotFound(_))));
        ledger.purchase(weekly(101)).unwrap();
        clock.advance(Duration::days(10));
        assert!(matches!(ledger.extend(extension(101)), Err(MessError::NotFound(_))));
    }

    #[test]
    fn extend_overrides_meals_and_end() {
        let (ledger, _) = ledger();
        ledger.purchase(weekly(101)).unwrap();
        let mut req = extension(101);
        req.meals_included = Some(MealsIncluded {
            dinner: true,
            ..Default::default()
        });
        req.end_date = Some("2025-01-10".into());
        let ext = ledger.extend(req).unwrap();
        assert!(ext.meals_included.dinner && !ext.meals_included.breakfast);
        assert_eq!(ext.end_date, date(2025, 1, 10));
    }

    #[test]
    fn extend_other_students_plan_is_not_found() {
        let (ledger, _) = ledger();
        let base = ledger.purchase(weekly(101)).unwrap();
        let mut req = extension(102);
        req.previous_transaction_id = Some(base.transaction_id);
        assert!(matches!(ledger.extend(req), Err(MessError::NotFound(_))));
    }

    #[test]
    fn concurrent_extensions_produce_one_successor() {
        let (ledger, _) = ledger();
        let base = ledger.purchase(weekly(101)).unwrap();
        let wins: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let ledger = ledger.clone();
                    let mut req = extension(101);
                    req.previous_transaction_id = Some(base.transaction_id);
                    s.spawn(move || ledger.extend(req).is_ok() as usize)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(wins, 1);
        assert!(mess_state::audit(&ledger.list_all()).is_empty());
    }

    // ── Cancel / settle ──────────────────────────────────────────────

    #[test]
    fn cancel_then_cancel_is_invalid_state() {
        let (ledger, _) = ledger();
        let tx = ledger.purchase(weekly(101)).unwrap();
        ledger.cancel(tx.transaction_id, "requested").unwrap();
        assert!(matches!(
            ledger.cancel(tx.transaction_id, "again"),
            Err(MessError::InvalidState(_))
        ));
        assert!(matches!(
            ledger.cancel(TransactionId::new(), "x"),
            Err(MessError::NotFound(_))
        ));
    }

    #[test]
    fn refund_cancels_and_revenue_drops() {
        let (ledger, _) = ledger();
        let tx = ledger.purchase(weekly(101)).unwrap();
        assert_eq!(ledger.counts().completed_revenue, 70_000);
        let refunded = ledger
            .settle_payment(tx.transaction_id, PaymentStatus::Refunded)
            .unwrap();
        assert_eq!(refunded.lifecycle_status, LifecycleStatus::Canceled);
        assert_eq!(ledger.counts().completed_revenue, 0);
        assert!(matches!(
            ledger.settle_payment(tx.transaction_id, PaymentStatus::Completed),
            Err(MessError::InvalidState(_))
        ));
    }

    #[test]
    fn history_is_newest_first() {
        let (ledger, clock) = ledger();
        let a = ledger.purchase(weekly(101)).unwrap();
        clock.advance(Duration::minutes(5));
        let b = ledger.purchase(weekly(101)).unwrap();
        let ids: Vec<_> = ledger
            .history_for_student(sid(101))
            .into_iter()
            .map(|t| t.transaction_id)
            .collect();
        assert_eq!(ids, vec![b.transaction_id, a.transaction_id]);
    }
}
