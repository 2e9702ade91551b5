//! # mess-core: Foundational Types for the Mess Backend
//!
//! Every other crate in the workspace depends on `mess-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** `NumericId`, `TransactionId`,
//!    `PriceSheetId`, `RedemptionToken`, `Email` are newtypes with validated
//!    constructors. No bare strings or integers for identifiers.
//!
//! 2. **Integer money.** [`Money`] is minor units in an `i64` and can never be
//!    negative once constructed. Floats never enter the pricing path.
//!
//! 3. **One calendar-day convention.** [`DateKey`] is always the UTC calendar
//!    date of an instant. Redemption verification and status reads share it.
//!
//! 4. **Injectable time.** Services read "now" through the [`Clock`] trait so
//!    tests can move the wall clock past a plan's end date.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `mess-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod meal;
pub mod money;
pub mod temporal;

pub use error::{FieldViolation, MessError, MessResult, ValidationErrors};
pub use identity::{Email, NumericId, PriceSheetId, PrincipalKind, RedemptionToken, TransactionId};
pub use meal::{DayKey, MealType, MealsIncluded, PlanType};
pub use money::{Money, VegPrice};
pub use temporal::{Clock, DateKey, ManualClock, SystemClock};
