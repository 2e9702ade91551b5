//! # mess-cli: Operator CLI for the Mess Backend
//!
//! Provides the `mess` command-line interface for maintenance that runs
//! directly against the database, outside the API process.
//!
//! ## Subcommands
//!
//! - `mess sweep`: expire overdue plans in one statement.
//! - `mess audit-chains`: verify every extension chain.
//! - `mess seed`: upsert menu entries and activate a price sheet from YAML.
//! - `mess hash-credential`: hash a credential read from stdin.
//!
//! ```bash
//! DATABASE_URL=postgres://... mess sweep --today 2025-01-08
//! mess seed seed.yaml --dry-run
//! ```

pub mod audit;
pub mod credential;
pub mod seed;
pub mod sweep;

use anyhow::{Context, Result};
use sqlx::PgPool;

/// Build the single-threaded runtime the database subcommands run on.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

/// Connect and apply migrations. A missing URL is an error for the CLI.
pub async fn connect(database_url: Option<&str>) -> Result<PgPool> {
    let url = database_url.context("DATABASE_URL (or --database-url) is required")?;
    mess_api::db::init_pool(Some(url))
        .await
        .context("failed to connect to the database")?
        .context("database pool was not created")
}
