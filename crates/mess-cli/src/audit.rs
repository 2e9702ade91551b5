//! # Audit-Chains Subcommand
//!
//! Loads every stored transaction and checks the extension chains: no
//! cycles, no dangling predecessor links, at most one successor per
//! predecessor, and successors that never start before their predecessor
//! ends.

use anyhow::{Context, Result};
use clap::Args;

use mess_state::{audit, ChainError, Transaction};

/// Arguments for the `mess audit-chains` subcommand.
#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Print findings as JSON lines instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Execute the audit subcommand. Returns 0 when clean, 1 on findings.
pub fn run_audit(args: &AuditArgs, database_url: Option<&str>) -> Result<u8> {
    let runtime = crate::runtime()?;
    let records = runtime.block_on(async {
        let pool = crate::connect(database_url).await?;
        mess_api::db::transactions::load_all(&pool)
            .await
            .context("failed to load transactions")
    })?;
    let findings = audit_records(&records);
    report(&findings, records.len(), args.json)?;
    Ok(if findings.is_empty() { 0 } else { 1 })
}

/// Audit an in-memory set of records.
pub fn audit_records(records: &[Transaction]) -> Vec<ChainError> {
    let findings = audit(records);
    tracing::info!(records = records.len(), findings = findings.len(), "chain audit complete");
    findings
}

fn report(findings: &[ChainError], total: usize, json: bool) -> Result<()> {
    if json {
        for finding in findings {
            let line = serde_json::json!({ "finding": finding.to_string() });
            println!("{}", serde_json::to_string(&line)?);
        }
        return Ok(());
    }
    println!("Transactions: {total}, chain findings: {}", findings.len());
    for finding in findings {
        println!("  FAIL: {finding}");
    }
    Ok(())
}
