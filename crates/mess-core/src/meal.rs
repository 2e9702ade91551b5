//! # Meals, Plans, and Menu Days
//!
//! The closed vocabularies of the mess: the four meal slots, the four plan
//! durations, the subset of meals a plan includes, and the eight menu slots
//! (seven weekdays plus "Specials").

use std::str::FromStr;

use chrono::{Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::MessError;

/// A meal slot that can be redeemed once per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Snacks,
    Dinner,
}

impl MealType {
    /// All meal slots in serving order.
    pub const ALL: [MealType; 4] = [Self::Breakfast, Self::Lunch, Self::Snacks, Self::Dinner];

    /// Return the string representation of this meal.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Snacks => "snacks",
            Self::Dinner => "dinner",
        }
    }
}

impl std::fmt::Display for MealType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = MessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "breakfast" => Ok(Self::Breakfast),
            "lunch" => Ok(Self::Lunch),
            "snacks" | "snack" => Ok(Self::Snacks),
            "dinner" => Ok(Self::Dinner),
            other => Err(MessError::invalid_field(
                "mealType",
                format!("unknown meal type {other:?}"),
            )),
        }
    }
}

/// Duration class of a meal plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Daily,
    Weekly,
    Monthly,
    Semester,
}

impl PlanType {
    /// All plan types, shortest first.
    pub const ALL: [PlanType; 4] = [Self::Daily, Self::Weekly, Self::Monthly, Self::Semester];

    /// Return the string representation of this plan type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Semester => "semester",
        }
    }

    /// Number of calendar days the plan nominally covers, inclusive of both ends.
    pub fn nominal_days(&self) -> u64 {
        match self {
            Self::Daily => 1,
            Self::Weekly => 7,
            Self::Monthly => 30,
            Self::Semester => 120,
        }
    }

    /// Inclusive end date of a plan of this type starting on `start`.
    pub fn default_end_date(&self, start: NaiveDate) -> Option<NaiveDate> {
        start.checked_add_days(Days::new(self.nominal_days() - 1))
    }
}

impl std::fmt::Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = MessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "semester" => Ok(Self::Semester),
            other => Err(MessError::invalid_field(
                "planType",
                format!("unknown plan type {other:?}"),
            )),
        }
    }
}

/// The meals a plan entitles its holder to.
///
/// `snacks` is optional on the wire and defaults to `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MealsIncluded {
    pub breakfast: bool,
    pub lunch: bool,
    pub dinner: bool,
    #[serde(default)]
    pub snacks: bool,
}

impl MealsIncluded {
    /// Whether the plan covers `meal`.
    pub fn includes(&self, meal: MealType) -> bool {
        match meal {
            MealType::Breakfast => self.breakfast,
            MealType::Lunch => self.lunch,
            MealType::Snacks => self.snacks,
            MealType::Dinner => self.dinner,
        }
    }

    /// Whether at least one meal is included.
    pub fn any(&self) -> bool {
        MealType::ALL.iter().any(|m| self.includes(*m))
    }
}

/// Menu slot: a weekday or the "Specials" board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DayKey {
    Sun,
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Specials,
}

impl DayKey {
    /// All slots in display order.
    pub const ALL: [DayKey; 8] = [
        Self::Sun,
        Self::Mon,
        Self::Tue,
        Self::Wed,
        Self::Thu,
        Self::Fri,
        Self::Sat,
        Self::Specials,
    ];

    /// Return the string representation of this slot.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sun => "Sun",
            Self::Mon => "Mon",
            Self::Tue => "Tue",
            Self::Wed => "Wed",
            Self::Thu => "Thu",
            Self::Fri => "Fri",
            Self::Sat => "Sat",
            Self::Specials => "Specials",
        }
    }

    /// The weekday slot for a calendar weekday.
    pub fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Sun => Self::Sun,
            Weekday::Mon => Self::Mon,
            Weekday::Tue => Self::Tue,
            Weekday::Wed => Self::Wed,
            Weekday::Thu => Self::Thu,
            Weekday::Fri => Self::Fri,
            Weekday::Sat => Self::Sat,
        }
    }
}

impl std::fmt::Display for DayKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayKey {
    type Err = MessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sun" | "sunday" => Ok(Self::Sun),
            "mon" | "monday" => Ok(Self::Mon),
            "tue" | "tues" | "tuesday" => Ok(Self::Tue),
            "wed" | "wednesday" => Ok(Self::Wed),
            "thu" | "thur" | "thurs" | "thursday" => Ok(Self::Thu),
            "fri" | "friday" => Ok(Self::Fri),
            "sat" | "saturday" => Ok(Self::Sat),
            "specials" | "special" => Ok(Self::Specials),
            other => Err(MessError::invalid_field(
                "dayKey",
                format!("unknown menu day {other:?}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meal_type_parses_case_insensitively() {
        assert_eq!("Breakfast".parse::<MealType>().unwrap(), MealType::Breakfast);
        assert_eq!("snack".parse::<MealType>().unwrap(), MealType::Snacks);
        assert!("brunch".parse::<MealType>().is_err());
    }

    #[test]
    fn weekly_plan_covers_seven_days() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = PlanType::Weekly.default_end_date(start).unwrap();
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 1, 7).unwrap());
        assert_eq!(PlanType::Daily.default_end_date(start).unwrap(), start);
    }

    #[test]
    fn meals_included_defaults_snacks_off() {
        let meals: MealsIncluded =
            serde_json::from_str(r#"{"breakfast":true,"lunch":true,"dinner":false}"#).unwrap();
        assert!(meals.includes(MealType::Breakfast));
        assert!(meals.includes(MealType::Lunch));
        assert!(!meals.includes(MealType::Dinner));
        assert!(!meals.includes(MealType::Snacks));
        assert!(meals.any());
        assert!(!MealsIncluded::default().any());
    }

    #[test]
    fn day_key_accepts_long_names() {
        assert_eq!("Wednesday".parse::<DayKey>().unwrap(), DayKey::Wed);
        assert_eq!("specials".parse::<DayKey>().unwrap(), DayKey::Specials);
        assert!("funday".parse::<DayKey>().is_err());
    }

    #[test]
    fn day_key_serializes_short_form() {
        assert_eq!(serde_json::to_string(&DayKey::Thu).unwrap(), "\"Thu\"");
        assert_eq!(DayKey::from_weekday(Weekday::Sat), DayKey::Sat);
    }
}
