//! # API Route Modules
//!
//! - `auth`: student self-registration, login and logout.
//! - `principals`: admin provisioning and profile maintenance.
//! - `prices`: versioned price sheets.
//! - `menu`: weekday menu and specials board.
//! - `transactions`: plan purchase, extension, payment, cancel, sweep.
//! - `students`: per-student plan history and today's redemptions.
//! - `redemptions`: the counter's verify endpoint.
//! - `admin`: dashboard summary.

pub mod admin;
pub mod auth;
pub mod menu;
pub mod prices;
pub mod principals;
pub mod redemptions;
pub mod students;
pub mod transactions;
