//! Transaction persistence on the `transactions` table.
//!
//! Lifecycle rules are enforced by `mess_state::Transaction`; the table
//! mirrors only the uniqueness rules (one successor per predecessor, unique
//! redemption tokens) and the date-range check.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use mess_core::{Money, NumericId, PlanType, RedemptionToken, TransactionId};
use mess_state::{LifecycleStatus, PaymentStatus, Transaction};

use super::{decode_error, from_json, to_json};

const COLUMNS: &str = "transaction_id, student_id, plan_type, meals_included, start_date, end_date,
     amount, payment_status, payment_method, lifecycle_status, redemption_token,
     is_extension, previous_transaction_id, transitions, created_at";

/// Insert a transaction, or update its mutable columns if it exists.
pub async fn upsert(pool: &PgPool, tx: &Transaction) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO transactions (transaction_id, student_id, plan_type, meals_included,
                                   start_date, end_date, amount, payment_status, payment_method,
                                   lifecycle_status, redemption_token, is_extension,
                                   previous_transaction_id, transitions, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
         ON CONFLICT (transaction_id) DO UPDATE
         SET payment_status = EXCLUDED.payment_status,
             lifecycle_status = EXCLUDED.lifecycle_status,
             transitions = EXCLUDED.transitions",
    )
    .bind(tx.transaction_id.0)
    .bind(tx.student_id.value())
    .bind(tx.plan_type.as_str())
    .bind(to_json("meals_included", &tx.meals_included)?)
    .bind(tx.start_date)
    .bind(tx.end_date)
    .bind(tx.amount.minor_units())
    .bind(tx.payment_status.as_str())
    .bind(&tx.payment_method)
    .bind(tx.lifecycle_status.as_str())
    .bind(tx.redemption_token.as_str())
    .bind(tx.is_extension)
    .bind(tx.previous_transaction_id.map(|p| p.0))
    .bind(to_json("transitions", &tx.transitions)?)
    .bind(tx.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Expire every live transaction whose end date is before `today`, in one
/// statement. Appends the transition to each record's log and returns the
/// expired ids.
pub async fn expire_overdue(
    pool: &PgPool,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<TransactionId>, sqlx::Error> {
    let ids: Vec<Uuid> = sqlx::query_scalar(
        "UPDATE transactions
         SET lifecycle_status = 'expired',
             transitions = transitions || jsonb_build_array(jsonb_build_object(
                 'from', lifecycle_status,
                 'to', 'expired',
                 'at', to_jsonb($2::timestamptz),
                 'reason', 'end date ' || end_date::text || ' passed'))
         WHERE lifecycle_status IN ('pending', 'active') AND end_date < $1
         RETURNING transaction_id",
    )
    .bind(today)
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(ids.into_iter().map(TransactionId).collect())
}

/// Load every transaction for startup hydration and chain audits.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Transaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {COLUMNS} FROM transactions ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(TransactionRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    transaction_id: Uuid,
    student_id: i64,
    plan_type: String,
    meals_included: serde_json::Value,
    start_date: NaiveDate,
    end_date: NaiveDate,
    amount: i64,
    payment_status: String,
    payment_method: String,
    lifecycle_status: String,
    redemption_token: String,
    is_extension: bool,
    previous_transaction_id: Option<Uuid>,
    transitions: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_record(self) -> Result<Transaction, sqlx::Error> {
        Ok(Transaction {
            transaction_id: TransactionId(self.transaction_id),
            student_id: NumericId::new(self.student_id)
                .map_err(|e| decode_error("student_id", e))?,
            plan_type: PlanType::from_str(&self.plan_type)
                .map_err(|e| decode_error("plan_type", e))?,
            meals_included: from_json("meals_included", self.meals_included)?,
            start_date: self.start_date,
            end_date: self.end_date,
            amount: Money::new(self.amount).map_err(|e| decode_error("amount", e))?,
            payment_status: PaymentStatus::from_str(&self.payment_status)
                .map_err(|e| decode_error("payment_status", e))?,
            payment_method: self.payment_method,
            lifecycle_status: LifecycleStatus::from_str(&self.lifecycle_status)
                .map_err(|e| decode_error("lifecycle_status", e))?,
            redemption_token: RedemptionToken::new(self.redemption_token)
                .map_err(|e| decode_error("redemption_token", e))?,
            is_extension: self.is_extension,
            previous_transaction_id: self.previous_transaction_id.map(TransactionId),
            transitions: from_json("transitions", self.transitions)?,
            created_at: self.created_at,
        })
    }
}
