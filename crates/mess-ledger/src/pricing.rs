//! # Pricing Configuration
//!
//! Versioned price sheets. At most one sheet is active at any time:
//! activation flips every other sheet to inactive in the same write-lock
//! closure that stores the new one.
//!
//! "Price as of D" ignores the active flag and picks the sheet with the
//! greatest `effectiveFrom <= D`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mess_core::{
    Clock, MessError, MessResult, Money, PlanType, PriceSheetId, ValidationErrors, VegPrice,
};

use crate::store::Store;

/// Per-duration plan prices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPrices {
    pub daily: VegPrice,
    pub weekly: VegPrice,
    pub monthly: VegPrice,
    pub semester: VegPrice,
}

impl PlanPrices {
    pub fn for_plan(&self, plan: PlanType) -> VegPrice {
        match plan {
            PlanType::Daily => self.daily,
            PlanType::Weekly => self.weekly,
            PlanType::Monthly => self.monthly,
            PlanType::Semester => self.semester,
        }
    }
}

/// A stored price sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSheet {
    pub id: PriceSheetId,
    pub breakfast_price: Money,
    pub lunch_price: VegPrice,
    pub snacks_price: Money,
    pub dinner_price: VegPrice,
    pub plan_price: PlanPrices,
    pub effective_from: DateTime<Utc>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Raw veg/non-veg pair as submitted.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVegPrice {
    pub veg: i64,
    pub non_veg: i64,
}

/// Raw plan prices as submitted.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RawPlanPrices {
    pub daily: Option<RawVegPrice>,
    pub weekly: Option<RawVegPrice>,
    pub monthly: Option<RawVegPrice>,
    pub semester: Option<RawVegPrice>,
}

/// A price sheet as submitted for activation.
///
/// Amounts are raw integers so that every negative field is reported
/// together instead of failing on the first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSheetDraft {
    pub breakfast_price: Option<i64>,
    pub lunch_price: Option<RawVegPrice>,
    pub snacks_price: Option<i64>,
    pub dinner_price: Option<RawVegPrice>,
    pub plan_price: Option<RawPlanPrices>,
    /// Defaults to the time of activation.
    pub effective_from: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

struct CheckedPrices {
    breakfast: Money,
    lunch: VegPrice,
    snacks: Money,
    dinner: VegPrice,
    plans: PlanPrices,
}

impl PriceSheetDraft {
    fn validate(&self) -> Result<CheckedPrices, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let breakfast = money_field("breakfastPrice", self.breakfast_price, &mut errors);
        let lunch = veg_field("lunchPrice", self.lunch_price, &mut errors);
        let snacks = money_field("snacksPrice", self.snacks_price, &mut errors);
        let dinner = veg_field("dinnerPrice", self.dinner_price, &mut errors);
        let plans = match self.plan_price {
            None => {
                errors.push("planPrice", "is required");
                PlanPrices::default()
            }
            Some(raw) => PlanPrices {
                daily: veg_field("planPrice.daily", raw.daily, &mut errors),
                weekly: veg_field("planPrice.weekly", raw.weekly, &mut errors),
                monthly: veg_field("planPrice.monthly", raw.monthly, &mut errors),
                semester: veg_field("planPrice.semester", raw.semester, &mut errors),
            },
        };
        errors.into_result()?;
        Ok(CheckedPrices {
            breakfast,
            lunch,
            snacks,
            dinner,
            plans,
        })
    }
}

fn money_field(field: &str, value: Option<i64>, errors: &mut ValidationErrors) -> Money {
    match errors.require(field, value) {
        Some(v) => Money::checked(field, v, errors),
        None => Money::ZERO,
    }
}

fn veg_field(field: &str, value: Option<RawVegPrice>, errors: &mut ValidationErrors) -> VegPrice {
    match errors.require(field, value) {
        Some(raw) => VegPrice::checked(field, raw.veg, raw.non_veg, errors),
        None => VegPrice::default(),
    }
}

/// The set of all price sheets.
#[derive(Debug, Clone)]
pub struct PriceBook {
    sheets: Store<PriceSheetId, PriceSheet>,
    clock: Arc<dyn Clock>,
}

impl PriceBook {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sheets: Store::new(),
            clock,
        }
    }

    /// Store `draft` as a new sheet and make it the only active one.
    pub fn activate(&self, draft: PriceSheetDraft) -> MessResult<PriceSheet> {
        let prices = draft.validate()?;
        let now = self.clock.now();
        let sheet = PriceSheet {
            id: PriceSheetId::new(),
            breakfast_price: prices.breakfast,
            lunch_price: prices.lunch,
            snacks_price: prices.snacks,
            dinner_price: prices.dinner,
            plan_price: prices.plans,
            effective_from: draft.effective_from.unwrap_or(now),
            is_active: true,
            notes: draft.notes.filter(|n| !n.trim().is_empty()),
            created_at: now,
        };
        self.sheets.write(|map| {
            for other in map.values_mut() {
                other.is_active = false;
            }
            map.insert(sheet.id, sheet.clone());
        });
        tracing::info!(sheet_id = %sheet.id, effective_from = %sheet.effective_from, "price sheet activated");
        Ok(sheet)
    }

    /// Make an already-stored sheet the only active one.
    pub fn activate_existing(&self, id: PriceSheetId) -> MessResult<PriceSheet> {
        let sheet = self.sheets.write(|map| {
            if !map.contains_key(&id) {
                return Err(MessError::NotFound(format!("price sheet {id}")));
            }
            let mut activated = None;
            for (key, sheet) in map.iter_mut() {
                sheet.is_active = *key == id;
                if sheet.is_active {
                    activated = Some(sheet.clone());
                }
            }
            activated.ok_or_else(|| MessError::NotFound(format!("price sheet {id}")))
        })?;
        tracing::info!(sheet_id = %id, "price sheet re-activated");
        Ok(sheet)
    }

    /// The sheet in force at `at`: greatest `effectiveFrom <= at`.
    pub fn price_as_of(&self, at: DateTime<Utc>) -> MessResult<PriceSheet> {
        self.sheets
            .read(|map| {
                map.values()
                    .filter(|s| s.effective_from <= at)
                    .max_by_key(|s| (s.effective_from, s.created_at))
                    .cloned()
            })
            .ok_or_else(|| MessError::NotFound(format!("no price sheet effective at {at}")))
    }

    /// The active sheet.
    pub fn active_sheet(&self) -> MessResult<PriceSheet> {
        self.sheets
            .read(|map| map.values().find(|s| s.is_active).cloned())
            .ok_or_else(|| MessError::NotFound("no active price sheet".into()))
    }

    pub fn get(&self, id: PriceSheetId) -> MessResult<PriceSheet> {
        self.sheets
            .get(&id)
            .ok_or_else(|| MessError::NotFound(format!("price sheet {id}")))
    }

    /// All sheets, newest `effectiveFrom` first.
    pub fn list(&self) -> Vec<PriceSheet> {
        let mut all = self.sheets.list();
        all.sort_by(|a, b| {
            b.effective_from
                .cmp(&a.effective_from)
                .then(b.created_at.cmp(&a.created_at))
        });
        all
    }

    /// Number of sheets flagged active. Never more than one.
    pub fn active_count(&self) -> usize {
        self.sheets.read(|map| map.values().filter(|s| s.is_active).count())
    }

    /// Load a persisted sheet without re-validating it.
    pub fn restore(&self, sheet: PriceSheet) {
        self.sheets.insert(sheet.id, sheet);
    }
}
