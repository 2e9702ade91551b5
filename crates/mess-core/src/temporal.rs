//! # Temporal Types: UTC Calendar Days and Clocks
//!
//! A [`DateKey`] is the UTC calendar date of an instant (ISO date truncation
//! of the UTC timestamp). Redemption verification and redemption status
//! both derive "today" from the same [`Clock`] through [`DateKey::of`], so
//! the per-day meal boundary is always UTC midnight.
//!
//! Services never call `Utc::now()` directly. They hold an
//! `Arc<dyn Clock>`: [`SystemClock`] in production, [`ManualClock`] in tests
//! that need to move time past a plan's end date.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::MessError;

/// UTC calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateKey(NaiveDate);

impl DateKey {
    /// The UTC calendar day containing `instant`.
    pub fn of(instant: DateTime<Utc>) -> Self {
        Self(instant.date_naive())
    }

    /// Wrap a calendar date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The underlying date.
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Render as `YYYY-MM-DD`.
    pub fn to_iso_date(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl std::fmt::Display for DateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso_date())
    }
}

impl FromStr for DateKey {
    type Err = MessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|e| MessError::invalid_field("date", format!("expected YYYY-MM-DD: {e}")))
    }
}

impl From<NaiveDate> for DateKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

/// Source of the current instant.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// The current UTC instant.
    fn now(&self) -> DateTime<Utc>;

    /// The current UTC calendar day.
    fn today(&self) -> DateKey {
        DateKey::of(self.now())
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// A clock frozen at `instant`.
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(instant)),
        }
    }

    /// A clock frozen at noon UTC on the given date.
    pub fn at_noon(date: NaiveDate) -> Self {
        let noon = date
            .and_hms_opt(12, 0, 0)
            .map(|dt| Utc.from_utc_datetime(&dt))
            .unwrap_or_else(Utc::now);
        Self::new(noon)
    }

    /// Move the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write() = instant;
    }

    /// Move the clock by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.now.write();
        *guard += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn date_key_is_stable_within_a_utc_day(secs in 0i64..86_400) {
            let midnight = Utc.with_ymd_and_hms(2025, 3, 9, 0, 0, 0).unwrap();
            let instant = midnight + chrono::Duration::seconds(secs);
            prop_assert_eq!(DateKey::of(instant), DateKey::of(midnight));
        }

        #[test]
        fn date_key_display_parses_back(days in 0i64..40_000) {
            let base = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
            let date = base + chrono::Duration::days(days);
            let key = DateKey::from_date(date);
            prop_assert_eq!(key.to_string().parse::<DateKey>().unwrap(), key);
        }
    }
}
