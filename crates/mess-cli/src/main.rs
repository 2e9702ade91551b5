//! # mess CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mess_cli::audit::{run_audit, AuditArgs};
use mess_cli::credential::{run_hash_credential, HashCredentialArgs};
use mess_cli::seed::{run_seed, SeedArgs};
use mess_cli::sweep::{run_sweep, SweepArgs};

/// Operator tooling for the campus mess backend.
#[derive(Parser, Debug)]
#[command(name = "mess", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Postgres connection URL.
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Expire overdue plans in the database.
    Sweep(SweepArgs),

    /// Verify every stored extension chain.
    AuditChains(AuditArgs),

    /// Upsert menu entries and activate a price sheet from a YAML file.
    Seed(SeedArgs),

    /// Hash a credential read from stdin.
    HashCredential(HashCredentialArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let database_url = cli.database_url.as_deref();
    let result = match cli.command {
        Commands::Sweep(args) => run_sweep(&args, database_url),
        Commands::AuditChains(args) => run_audit(&args, database_url),
        Commands::Seed(args) => run_seed(&args, database_url),
        Commands::HashCredential(args) => run_hash_credential(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
