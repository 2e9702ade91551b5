//! # mess-ledger: Domain Services
//!
//! The services behind the API, each over thread-safe in-memory stores:
//!
//! - [`IdentityRegistry`]: students, staff, admins; credential checks.
//! - [`SessionStore`]: bearer sessions minted at login.
//! - [`PriceBook`]: versioned price sheets with a single active sheet.
//! - [`MenuCatalog`]: per-weekday menu plus a specials board.
//! - [`Ledger`]: purchased plans, extensions, payment settlement, expiry.
//! - [`RedemptionTracker`]: once-per-day meal redemption.
//!
//! [`MessServices`] wires them together around one injected [`Clock`], so
//! tests can drive every time-dependent rule with a manual clock.
//!
//! ## Concurrency
//!
//! Every check-then-act sequence (uniqueness on register, single active
//! price sheet, token uniqueness, expiry sweeps, redemption claims) runs
//! inside a single write-lock closure. No lock is held across an `.await`.

pub mod identity;
pub mod ledger;
pub mod menu;
pub mod pricing;
pub mod redemption;
pub mod session;
pub mod store;

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;

use mess_core::{Clock, MealType, MessResult, PrincipalKind, SystemClock};
use mess_crypto::{Credential, CredentialHasher, RandomTokenSource, Sha256CredentialHasher, TokenSource};

pub use identity::{IdentityRegistry, Principal, ProfileUpdate, Registration};
pub use ledger::{ExtendRequest, Ledger, LedgerCounts, PurchaseRequest, StudentDirectory};
pub use menu::{MenuCatalog, MenuEntry, MenuFields};
pub use pricing::{PlanPrices, PriceBook, PriceSheet, PriceSheetDraft, RawPlanPrices, RawVegPrice};
pub use redemption::{RedemptionIdentifier, RedemptionOutcome, RedemptionTracker};
pub use session::{Session, SessionStore, DEFAULT_SESSION_TTL_SECS};
pub use store::Store;

/// Aggregate figures for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSummary {
    pub students: usize,
    pub staff: usize,
    pub admins: usize,
    pub pending_plans: usize,
    pub active_plans: usize,
    pub expired_plans: usize,
    pub canceled_plans: usize,
    pub completed_revenue: i64,
    pub redemptions_today: Vec<MealCount>,
    pub has_active_price_sheet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealCount {
    pub meal_type: MealType,
    pub count: usize,
}

/// All services, sharing one clock.
#[derive(Debug, Clone)]
pub struct MessServices {
    pub identity: IdentityRegistry,
    pub sessions: SessionStore,
    pub pricing: PriceBook,
    pub menu: MenuCatalog,
    pub ledger: Ledger,
    pub redemptions: RedemptionTracker,
    pub clock: Arc<dyn Clock>,
}

impl MessServices {
    /// Production wiring: wall clock, random tokens, default hasher.
    pub fn new() -> Self {
        Self::with_parts(
            Arc::new(SystemClock),
            Arc::new(Sha256CredentialHasher::new()),
            Arc::new(RandomTokenSource),
            Duration::seconds(DEFAULT_SESSION_TTL_SECS),
        )
    }

    /// Wiring with explicit collaborators.
    pub fn with_parts(
        clock: Arc<dyn Clock>,
        hasher: Arc<dyn CredentialHasher>,
        tokens: Arc<dyn TokenSource>,
        session_ttl: Duration,
    ) -> Self {
        let identity = IdentityRegistry::new(hasher, clock.clone());
        let ledger = Ledger::new(Arc::new(identity.clone()), tokens, clock.clone());
        Self {
            sessions: SessionStore::new(session_ttl, clock.clone()),
            pricing: PriceBook::new(clock.clone()),
            menu: MenuCatalog::new(clock.clone()),
            redemptions: RedemptionTracker::new(ledger.clone(), clock.clone()),
            ledger,
            identity,
            clock,
        }
    }

    /// Authenticate and open a session.
    pub fn login(
        &self,
        email: &str,
        credential: &Credential,
        kind: PrincipalKind,
    ) -> MessResult<(Principal, Session)> {
        let principal = self.identity.authenticate(email, credential, kind)?;
        let session = self.sessions.issue(principal.kind, principal.numeric_id);
        tracing::info!(kind = %principal.kind, numeric_id = %principal.numeric_id, "login");
        Ok((principal, session))
    }

    /// Delete a principal and drop its sessions.
    pub fn remove_principal(
        &self,
        kind: PrincipalKind,
        id: mess_core::NumericId,
    ) -> MessResult<Principal> {
        let removed = self.identity.delete(kind, id)?;
        self.sessions.revoke_all_for(kind, id);
        Ok(removed)
    }

    /// Dashboard figures. Sweeps first so counts reflect today.
    pub fn summary(&self) -> AdminSummary {
        self.ledger.sweep();
        let counts = self.ledger.counts();
        let today = self.clock.today();
        AdminSummary {
            students: self.identity.count(PrincipalKind::Student),
            staff: self.identity.count(PrincipalKind::MessStaff),
            admins: self.identity.count(PrincipalKind::Admin),
            pending_plans: counts.pending,
            active_plans: counts.active,
            expired_plans: counts.expired,
            canceled_plans: counts.canceled,
            completed_revenue: counts.completed_revenue,
            redemptions_today: self
                .redemptions
                .meal_counts(today)
                .into_iter()
                .map(|(meal_type, count)| MealCount { meal_type, count })
                .collect(),
            has_active_price_sheet: self.pricing.active_sheet().is_ok(),
        }
    }
}

impl Default for MessServices {
    fn default() -> Self {
        Self::new()
    }
}
