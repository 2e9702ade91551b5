//! Menu persistence on the `menu_entries` table.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use mess_core::DayKey;
use mess_ledger::MenuEntry;

use super::decode_error;

pub async fn upsert(pool: &PgPool, entry: &MenuEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO menu_entries (day_key, breakfast, lunch, snacks, dinner, last_modified_by, last_modified_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (day_key) DO UPDATE
         SET breakfast = EXCLUDED.breakfast,
             lunch = EXCLUDED.lunch,
             snacks = EXCLUDED.snacks,
             dinner = EXCLUDED.dinner,
             last_modified_by = EXCLUDED.last_modified_by,
             last_modified_at = EXCLUDED.last_modified_at",
    )
    .bind(entry.day_key.as_str())
    .bind(&entry.breakfast)
    .bind(&entry.lunch)
    .bind(&entry.snacks)
    .bind(&entry.dinner)
    .bind(&entry.last_modified_by)
    .bind(entry.last_modified_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, day: DayKey) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM menu_entries WHERE day_key = $1")
        .bind(day.as_str())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load_all(pool: &PgPool) -> Result<Vec<MenuEntry>, sqlx::Error> {
    let rows = sqlx::query_as::<_, MenuRow>(
        "SELECT day_key, breakfast, lunch, snacks, dinner, last_modified_by, last_modified_at
         FROM menu_entries",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(MenuRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct MenuRow {
    day_key: String,
    breakfast: String,
    lunch: String,
    snacks: String,
    dinner: String,
    last_modified_by: String,
    last_modified_at: DateTime<Utc>,
}

impl MenuRow {
    fn into_record(self) -> Result<MenuEntry, sqlx::Error> {
        Ok(MenuEntry {
            day_key: DayKey::from_str(&self.day_key).map_err(|e| decode_error("day_key", e))?,
            breakfast: self.breakfast,
            lunch: self.lunch,
            snacks: self.snacks,
            dinner: self.dinner,
            last_modified_by: self.last_modified_by,
            last_modified_at: self.last_modified_at,
        })
    }
}
