//! # Database Persistence Layer
//!
//! Postgres persistence for the mess backend via SQLx.
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, every
//! mutation is written through to Postgres and the in-memory services are
//! hydrated from it on startup. When absent, the API runs in-memory only
//! (suitable for development and testing).
//!
//! Sessions are never persisted.

pub mod menu;
pub mod price_sheets;
pub mod principals;
pub mod redemptions;
pub mod transactions;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::AppError;

/// Connect to `database_url` and run embedded migrations.
///
/// Returns `None` if no URL is configured (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(database_url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let url = match database_url {
        Some(url) => url,
        None => {
            tracing::warn!(
                "DATABASE_URL not set; running in-memory only mode. \
                 State will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Map a failed write-through to a 500.
///
/// The in-memory record already changed, so the failure is surfaced to the
/// client rather than silently lost on restart.
pub(crate) fn write_failed(entity: &'static str, err: sqlx::Error) -> AppError {
    tracing::error!(entity, error = %err, "database write-through failed");
    AppError::Internal(format!("{entity} recorded in memory but database persist failed"))
}

/// Build a decode error for a row that does not map onto a domain value.
pub(crate) fn decode_error(column: &str, detail: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(format!("column {column}: {detail}").into())
}

/// Serialize a value into a JSONB column.
pub(crate) fn to_json<T: serde::Serialize>(column: &str, value: &T) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(value).map_err(|e| {
        tracing::error!(column, error = %e, "failed to serialize column value");
        sqlx::Error::Encode(Box::new(e))
    })
}

/// Deserialize a JSONB column into a domain value.
pub(crate) fn from_json<T: serde::de::DeserializeOwned>(
    column: &str,
    value: serde_json::Value,
) -> Result<T, sqlx::Error> {
    serde_json::from_value(value).map_err(|e| decode_error(column, e))
}
