//! # Seed Subcommand
//!
//! Loads a YAML seed file with menu entries and an optional price sheet,
//! validates everything through the same domain services the API uses, and
//! upserts the result. Nothing is written unless the whole file is valid.
//!
//! ```yaml
//! menu:
//!   Mon: { breakfast: Idli, lunch: Rajma chawal, dinner: Roti sabzi }
//!   Specials: { dinner: Biryani on Fridays }
//! priceSheet:
//!   breakfastPrice: 40
//!   lunchPrice: { veg: 60, nonVeg: 80 }
//!   snacksPrice: 20
//!   dinnerPrice: { veg: 70, nonVeg: 90 }
//!   planPrice:
//!     daily: { veg: 150, nonVeg: 190 }
//!     weekly: { veg: 700, nonVeg: 900 }
//!     monthly: { veg: 2800, nonVeg: 3600 }
//!     semester: { veg: 14000, nonVeg: 18000 }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;

use mess_core::{Clock, DayKey, SystemClock};
use mess_ledger::{MenuCatalog, MenuEntry, MenuFields, PriceBook, PriceSheet, PriceSheetDraft};

/// Recorded as `lastModifiedBy` on seeded menu entries.
pub const SEED_AUTHOR: &str = "seed";

/// Arguments for the `mess seed` subcommand.
#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Path to the YAML seed file.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Validate and print what would be written, without connecting.
    #[arg(long)]
    pub dry_run: bool,
}

/// On-disk seed file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SeedFile {
    #[serde(default)]
    pub menu: BTreeMap<String, MenuFields>,
    #[serde(default)]
    pub price_sheet: Option<PriceSheetDraft>,
}

/// Validated records, ready to write.
#[derive(Debug)]
pub struct SeedPlan {
    pub menu: Vec<MenuEntry>,
    pub price_sheet: Option<PriceSheet>,
}

/// Read and parse a seed file.
pub fn load(path: &Path) -> Result<SeedFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Validate a seed file into records. Reports every bad day and price field.
pub fn plan(seed: SeedFile, clock: Arc<dyn Clock>) -> Result<SeedPlan> {
    let catalog = MenuCatalog::new(clock.clone());
    let mut problems = Vec::new();
    let mut menu = Vec::new();
    for (raw_day, fields) in seed.menu {
        let day = match raw_day.parse::<DayKey>() {
            Ok(day) => day,
            Err(e) => {
                problems.push(format!("menu.{raw_day}: {e}"));
                continue;
            }
        };
        match catalog.upsert_day(day, fields, SEED_AUTHOR) {
            Ok(entry) => menu.push(entry),
            Err(e) => problems.push(format!("menu.{raw_day}: {e}")),
        }
    }

    let price_sheet = match seed.price_sheet {
        Some(draft) => match PriceBook::new(clock).activate(draft) {
            Ok(sheet) => Some(sheet),
            Err(e) => {
                problems.push(format!("priceSheet: {e}"));
                None
            }
        },
        None => None,
    };

    if !problems.is_empty() {
        bail!("seed file is invalid:\n  {}", problems.join("\n  "));
    }
    menu.sort_by_key(|e| e.day_key);
    Ok(SeedPlan { menu, price_sheet })
}

/// Execute the seed subcommand. Returns the process exit code.
pub fn run_seed(args: &SeedArgs, database_url: Option<&str>) -> Result<u8> {
    let seed = load(&args.file)?;
    let plan = plan(seed, Arc::new(SystemClock))?;

    println!(
        "Seed: {} menu entr{}, {} price sheet",
        plan.menu.len(),
        if plan.menu.len() == 1 { "y" } else { "ies" },
        if plan.price_sheet.is_some() { "1" } else { "no" }
    );
    if args.dry_run {
        for entry in &plan.menu {
            println!("  menu {}", entry.day_key);
        }
        if let Some(sheet) = &plan.price_sheet {
            println!("  price sheet effective {}", sheet.effective_from);
        }
        return Ok(0);
    }

    let runtime = crate::runtime()?;
    runtime.block_on(async {
        let pool = crate::connect(database_url).await?;
        for entry in &plan.menu {
            mess_api::db::menu::upsert(&pool, entry)
                .await
                .with_context(|| format!("failed to write menu for {}", entry.day_key))?;
        }
        if let Some(sheet) = &plan.price_sheet {
            mess_api::db::price_sheets::insert_active(&pool, sheet)
                .await
                .context("failed to activate price sheet")?;
        }
        Ok::<_, anyhow::Error>(())
    })?;
    tracing::info!(menu = plan.menu.len(), price_sheet = plan.price_sheet.is_some(), "seed applied");
    Ok(0)
}
