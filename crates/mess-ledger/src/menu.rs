//! # Menu Catalog
//!
//! One entry per weekday plus a "Specials" board, with upsert semantics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mess_core::{Clock, DayKey, MessError, MessResult, ValidationErrors};

use crate::store::Store;

const MAX_FIELD_CHARS: usize = 2_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuEntry {
    pub day_key: DayKey,
    pub breakfast: String,
    pub lunch: String,
    pub snacks: String,
    pub dinner: String,
    pub last_modified_by: String,
    pub last_modified_at: DateTime<Utc>,
}

/// The free-text body of a menu entry. Missing fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuFields {
    pub breakfast: String,
    pub lunch: String,
    pub snacks: String,
    pub dinner: String,
}

impl MenuFields {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for (field, value) in [
            ("breakfast", &self.breakfast),
            ("lunch", &self.lunch),
            ("snacks", &self.snacks),
            ("dinner", &self.dinner),
        ] {
            if value.chars().count() > MAX_FIELD_CHARS {
                errors.push(field, format!("must be at most {MAX_FIELD_CHARS} characters"));
            }
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone)]
pub struct MenuCatalog {
    entries: Store<DayKey, MenuEntry>,
    clock: Arc<dyn Clock>,
}

impl MenuCatalog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Store::new(),
            clock,
        }
    }

    /// Create or replace the entry for `day`.
    pub fn upsert_day(
        &self,
        day: DayKey,
        fields: MenuFields,
        modified_by: &str,
    ) -> MessResult<MenuEntry> {
        fields.validate()?;
        let entry = MenuEntry {
            day_key: day,
            breakfast: fields.breakfast.trim().to_string(),
            lunch: fields.lunch.trim().to_string(),
            snacks: fields.snacks.trim().to_string(),
            dinner: fields.dinner.trim().to_string(),
            last_modified_by: modified_by.to_string(),
            last_modified_at: self.clock.now(),
        };
        self.entries.insert(day, entry.clone());
        tracing::info!(day = %day, modified_by, "menu updated");
        Ok(entry)
    }

    pub fn get_day(&self, day: DayKey) -> MessResult<MenuEntry> {
        self.entries
            .get(&day)
            .ok_or_else(|| MessError::NotFound(format!("menu for {day}")))
    }

    /// Every entry, Sun..Sat then Specials.
    pub fn list_all(&self) -> Vec<MenuEntry> {
        let mut all = self.entries.list();
        all.sort_by_key(|e| e.day_key);
        all
    }

    pub fn delete_day(&self, day: DayKey) -> MessResult<MenuEntry> {
        let removed = self
            .entries
            .remove(&day)
            .ok_or_else(|| MessError::NotFound(format!("menu for {day}")))?;
        tracing::info!(day = %day, "menu entry deleted");
        Ok(removed)
    }

    /// Load a persisted entry.
    pub fn restore(&self, entry: MenuEntry) {
        self.entries.insert(entry.day_key, entry);
    }
}
