//! # Sweep Subcommand
//!
//! Expires every pending or active plan whose end date is before the
//! cutoff day, directly in the database. The API hydrates from the same
//! tables, so a restart picks the change up; a running API process sweeps
//! its own copy on its next pass.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Args;

/// Arguments for the `mess sweep` subcommand.
#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Treat this UTC day as today (YYYY-MM-DD). Defaults to the current day.
    #[arg(long, value_parser = parse_day)]
    pub today: Option<NaiveDate>,
}

fn parse_day(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

/// Execute the sweep subcommand. Returns the process exit code.
pub fn run_sweep(args: &SweepArgs, database_url: Option<&str>) -> Result<u8> {
    let now = Utc::now();
    let today = args.today.unwrap_or_else(|| now.date_naive());
    let runtime = crate::runtime()?;
    let expired = runtime.block_on(async {
        let pool = crate::connect(database_url).await?;
        mess_api::db::transactions::expire_overdue(&pool, today, now)
            .await
            .context("expiry sweep failed")
    })?;

    tracing::info!(%today, expired = expired.len(), "sweep complete");
    println!("Expired {} plan(s) ending before {today}", expired.len());
    for id in &expired {
        println!("  {id}");
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_argument() {
        assert_eq!(
            parse_day("2025-01-08").unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 8).unwrap()
        );
        assert!(parse_day("08/01/2025").is_err());
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let args = SweepArgs { today: None };
        let err = run_sweep(&args, None).unwrap_err();
        assert!(format!("{err:#}").contains("DATABASE_URL"));
    }
}
