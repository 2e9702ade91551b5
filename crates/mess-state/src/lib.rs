//! # mess-state: Meal Plan State Machines
//!
//! Pure state machines with no storage and no clock of their own. Callers
//! pass the current instant and the current UTC day in, which keeps every
//! transition deterministic under test.
//!
//! ## State Machines
//!
//! - **Transaction** (`transaction.rs`): the lifecycle of a purchased meal
//!   plan. The lifecycle status is derived from the payment status at
//!   creation and then moved only by explicit transitions (payment
//!   settlement, cancellation, time-driven expiry). Every transition is
//!   appended to the record's transition log.
//!
//! - **Daily redemption** (`redemption.rs`): four once-per-day meal flags
//!   for one student on one UTC calendar day. A flag moves false → true at
//!   most once.
//!
//! - **Extension chain** (`chain.rs`): walks the `previousTransactionId`
//!   links of a transaction back to its root, rejecting cycles, dangling
//!   links, and date regressions. [`chain::audit`] checks a full set of
//!   records, including the one-successor-per-predecessor rule.

pub mod chain;
pub mod redemption;
pub mod transaction;

pub use chain::{audit, walk, ChainError};
pub use redemption::{DailyRedemption, RedemptionError};
pub use transaction::{
    LifecycleStatus, LifecycleTransition, PaymentStatus, PlanTerms, Transaction, TransactionError,
};
