//! Daily redemption persistence on the `daily_redemptions` table.
//!
//! A claim is a conditional update that only flips a flag that is still
//! `FALSE`, so two processes racing on the same meal cannot both succeed.

use chrono::NaiveDate;
use sqlx::PgPool;

use mess_core::{DateKey, MealType, NumericId};
use mess_state::DailyRedemption;

use super::decode_error;

/// Claim `meal` for `(student, day)`. Returns `false` if it was already
/// claimed in the database.
pub async fn claim(
    pool: &PgPool,
    student: NumericId,
    day: DateKey,
    meal: MealType,
) -> Result<bool, sqlx::Error> {
    sqlx::query(
        "INSERT INTO daily_redemptions (student_id, date_key) VALUES ($1, $2)
         ON CONFLICT (student_id, date_key) DO NOTHING",
    )
    .bind(student.value())
    .bind(day.date())
    .execute(pool)
    .await?;

    // The column name comes from a closed enum, never from input.
    let column = meal.as_str();
    let result = sqlx::query(&format!(
        "UPDATE daily_redemptions SET {column} = TRUE
         WHERE student_id = $1 AND date_key = $2 AND {column} = FALSE"
    ))
    .bind(student.value())
    .bind(day.date())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Load every record for `day` for startup hydration.
pub async fn load_for_day(pool: &PgPool, day: DateKey) -> Result<Vec<DailyRedemption>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RedemptionRow>(
        "SELECT student_id, date_key, breakfast, lunch, snacks, dinner
         FROM daily_redemptions WHERE date_key = $1",
    )
    .bind(day.date())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(RedemptionRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct RedemptionRow {
    student_id: i64,
    date_key: NaiveDate,
    breakfast: bool,
    lunch: bool,
    snacks: bool,
    dinner: bool,
}

impl RedemptionRow {
    fn into_record(self) -> Result<DailyRedemption, sqlx::Error> {
        let student =
            NumericId::new(self.student_id).map_err(|e| decode_error("student_id", e))?;
        let mut record = DailyRedemption::new(student, DateKey::from_date(self.date_key));
        record.breakfast = self.breakfast;
        record.lunch = self.lunch;
        record.snacks = self.snacks;
        record.dinner = self.dinner;
        Ok(record)
    }
}
