//! # Sessions
//!
//! A successful login mints an opaque bearer token bound to one principal.
//! Sessions live only in memory; a restart logs everyone out. Expired
//! sessions are dropped lazily on lookup and in bulk by [`SessionStore::purge_expired`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use mess_core::{Clock, NumericId, PrincipalKind};
use mess_crypto::{random_hex, token::TOKEN_BYTES};

use crate::store::Store;

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub kind: PrincipalKind,
    pub numeric_id: NumericId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Store<String, Session>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Store::new(),
            ttl,
            clock,
        }
    }

    /// Mint a session for a principal.
    pub fn issue(&self, kind: PrincipalKind, numeric_id: NumericId) -> Session {
        let now = self.clock.now();
        let session = Session {
            token: random_hex(TOKEN_BYTES),
            kind,
            numeric_id,
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.insert(session.token.clone(), session.clone());
        session
    }

    /// The live session for `token`, if any.
    pub fn resolve(&self, token: &str) -> Option<Session> {
        let now = self.clock.now();
        let key = token.to_string();
        let session = self.sessions.get(&key)?;
        if session.expires_at <= now {
            self.sessions.remove(&key);
            return None;
        }
        Some(session)
    }

    /// Revoke one session. Returns whether it existed.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(&token.to_string()).is_some()
    }

    /// Revoke every session of a principal.
    pub fn revoke_all_for(&self, kind: PrincipalKind, numeric_id: NumericId) -> usize {
        self.sessions.write(|map| {
            let before = map.len();
            map.retain(|_, s| !(s.kind == kind && s.numeric_id == numeric_id));
            before - map.len()
        })
    }

    /// Drop every expired session. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.sessions.write(|map| {
            let before = map.len();
            map.retain(|_, s| s.expires_at > now);
            before - map.len()
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mess_core::ManualClock;

    fn setup() -> (SessionStore, ManualClock) {
        let clock = ManualClock::at_noon(NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        let store = SessionStore::new(Duration::hours(1), Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn issued_session_resolves_until_expiry() {
        let (store, clock) = setup();
        let s = store.issue(PrincipalKind::Student, NumericId::new(101).unwrap());
        assert_eq!(s.token.len(), 64);
        assert_eq!(store.resolve(&s.token), Some(s.clone()));
        clock.advance(Duration::minutes(61));
        assert_eq!(store.resolve(&s.token), None);
        assert!(store.is_empty());
    }

    #[test]
    fn revoke_logs_out() {
        let (store, _) = setup();
        let s = store.issue(PrincipalKind::Admin, NumericId::new(1).unwrap());
        assert!(store.revoke(&s.token));
        assert!(!store.revoke(&s.token));
        assert!(store.resolve(&s.token).is_none());
    }

    #[test]
    fn revoke_all_for_principal() {
        let (store, _) = setup();
        let id = NumericId::new(5).unwrap();
        store.issue(PrincipalKind::Student, id);
        store.issue(PrincipalKind::Student, id);
        store.issue(PrincipalKind::MessStaff, id);
        assert_eq!(store.revoke_all_for(PrincipalKind::Student, id), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn purge_drops_only_expired() {
        let (store, clock) = setup();
        store.issue(PrincipalKind::Student, NumericId::new(1).unwrap());
        clock.advance(Duration::minutes(30));
        store.issue(PrincipalKind::Student, NumericId::new(2).unwrap());
        clock.advance(Duration::minutes(45));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }
}
