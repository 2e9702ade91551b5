//! Price sheet persistence on the `price_sheets` table.
//!
//! Activation deactivates every other sheet in the same database
//! transaction; the partial unique index on `is_active` rejects any
//! interleaving that would leave two active sheets.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use mess_core::{Money, PriceSheetId};
use mess_ledger::PriceSheet;

use super::{decode_error, from_json, to_json};

/// Insert a freshly activated sheet as the only active one.
pub async fn insert_active(pool: &PgPool, sheet: &PriceSheet) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE price_sheets SET is_active = FALSE WHERE is_active")
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "INSERT INTO price_sheets (id, breakfast_price, lunch_price, snacks_price, dinner_price,
                                   plan_price, effective_from, is_active, notes, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $9)",
    )
    .bind(sheet.id.0)
    .bind(sheet.breakfast_price.minor_units())
    .bind(to_json("lunch_price", &sheet.lunch_price)?)
    .bind(sheet.snacks_price.minor_units())
    .bind(to_json("dinner_price", &sheet.dinner_price)?)
    .bind(to_json("plan_price", &sheet.plan_price)?)
    .bind(sheet.effective_from)
    .bind(&sheet.notes)
    .bind(sheet.created_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await
}

/// Make an existing sheet the only active one.
pub async fn activate_existing(pool: &PgPool, id: PriceSheetId) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE price_sheets SET is_active = FALSE WHERE is_active AND id <> $1")
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("UPDATE price_sheets SET is_active = TRUE WHERE id = $1")
        .bind(id.0)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Load every sheet for startup hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<PriceSheet>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PriceSheetRow>(
        "SELECT id, breakfast_price, lunch_price, snacks_price, dinner_price, plan_price,
                effective_from, is_active, notes, created_at
         FROM price_sheets ORDER BY effective_from DESC",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(PriceSheetRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct PriceSheetRow {
    id: Uuid,
    breakfast_price: i64,
    lunch_price: serde_json::Value,
    snacks_price: i64,
    dinner_price: serde_json::Value,
    plan_price: serde_json::Value,
    effective_from: DateTime<Utc>,
    is_active: bool,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl PriceSheetRow {
    fn into_record(self) -> Result<PriceSheet, sqlx::Error> {
        Ok(PriceSheet {
            id: PriceSheetId(self.id),
            breakfast_price: Money::new(self.breakfast_price)
                .map_err(|e| decode_error("breakfast_price", e))?,
            lunch_price: from_json("lunch_price", self.lunch_price)?,
            snacks_price: Money::new(self.snacks_price)
                .map_err(|e| decode_error("snacks_price", e))?,
            dinner_price: from_json("dinner_price", self.dinner_price)?,
            plan_price: from_json("plan_price", self.plan_price)?,
            effective_from: self.effective_from,
            is_active: self.is_active,
            notes: self.notes,
            created_at: self.created_at,
        })
    }
}
