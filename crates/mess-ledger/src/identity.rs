//! # Identity Registry
//!
//! Students, mess staff, and admins share one registry keyed by
//! `(kind, numericId)`. Two uniqueness rules hold across every write:
//!
//! - a `numericId` is used at most once within a kind;
//! - an email is used at most once across **all** kinds.
//!
//! Both are checked and applied under a single write lock. Credentials are
//! hashed before the lock is taken so the slow part never blocks readers.
//!
//! Authentication failures are indistinguishable: an unknown email, a
//! wrong kind, and a wrong credential all burn one hash verification and
//! return [`MessError::Unauthorized`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use mess_core::{
    Clock, Email, MessError, MessResult, NumericId, PrincipalKind, ValidationErrors,
};
use mess_crypto::{Credential, CredentialHash, CredentialHasher};

use crate::ledger::StudentDirectory;
use crate::store::Store;

const MIN_CREDENTIAL_CHARS: usize = 6;
const MAX_CREDENTIAL_CHARS: usize = 128;
const MAX_NAME_CHARS: usize = 200;

/// A registered principal.
#[derive(Debug, Clone)]
pub struct Principal {
    pub kind: PrincipalKind,
    pub numeric_id: NumericId,
    pub name: String,
    pub email: Email,
    pub credential_hash: CredentialHash,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw registration input. Every missing or malformed field is reported.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: Option<String>,
    pub numeric_id: Option<i64>,
    pub email: Option<String>,
    pub credential: Option<Credential>,
}

/// Partial profile update. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub credential: Option<Credential>,
}

type PrincipalKey = (PrincipalKind, NumericId);

/// Registry of all principals.
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    principals: Store<PrincipalKey, Principal>,
    hasher: Arc<dyn CredentialHasher>,
    clock: Arc<dyn Clock>,
}

impl IdentityRegistry {
    pub fn new(hasher: Arc<dyn CredentialHasher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            principals: Store::new(),
            hasher,
            clock,
        }
    }

    /// Register a new principal of `kind`.
    pub fn register(&self, kind: PrincipalKind, input: Registration) -> MessResult<Principal> {
        let mut errors = ValidationErrors::new();
        let name = errors
            .require("name", input.name)
            .and_then(|n| checked_name(n, &mut errors));
        let numeric_id = errors
            .require("numericId", input.numeric_id)
            .and_then(|id| checked_id(id, &mut errors));
        let email = errors
            .require("email", input.email)
            .and_then(|e| checked_email(&e, &mut errors));
        let credential = errors
            .require("credential", input.credential)
            .and_then(|c| checked_credential(c, &mut errors));
        errors.into_result()?;
        let (Some(name), Some(numeric_id), Some(email), Some(credential)) =
            (name, numeric_id, email, credential)
        else {
            return Err(MessError::invalid_field("body", "incomplete registration"));
        };

        let credential_hash = self.hasher.hash(&credential);
        let now = self.clock.now();
        let principal = Principal {
            kind,
            numeric_id,
            name,
            email,
            credential_hash,
            created_at: now,
            updated_at: now,
        };

        self.principals.write(|map| {
            if map.contains_key(&(kind, numeric_id)) {
                return Err(MessError::Conflict(format!(
                    "{kind} {numeric_id} is already registered"
                )));
            }
            if map.values().any(|p| p.email == principal.email) {
                return Err(MessError::Conflict("email is already registered".into()));
            }
            map.insert((kind, numeric_id), principal.clone());
            Ok(())
        })?;

        tracing::info!(kind = %kind, numeric_id = %numeric_id, "principal registered");
        Ok(principal)
    }

    /// Check an email/credential pair for a principal of `claimed`.
    pub fn authenticate(
        &self,
        email: &str,
        credential: &Credential,
        claimed: PrincipalKind,
    ) -> MessResult<Principal> {
        let found = Email::parse(email)
            .ok()
            .and_then(|email| self.find_by_email(&email))
            .filter(|p| p.kind == claimed);

        let verified = match &found {
            Some(p) => self.hasher.verify(credential, &p.credential_hash),
            None => self.hasher.verify_dummy(credential),
        };

        match found {
            Some(p) if verified => Ok(p),
            _ => {
                tracing::warn!(kind = %claimed, "authentication failed");
                Err(MessError::Unauthorized)
            }
        }
    }

    /// Look a principal up by kind and id.
    pub fn find(&self, kind: PrincipalKind, id: NumericId) -> MessResult<Principal> {
        self.principals
            .get(&(kind, id))
            .ok_or_else(|| MessError::NotFound(format!("{kind} {id}")))
    }

    /// Look a principal of any kind up by normalized email.
    pub fn find_by_email(&self, email: &Email) -> Option<Principal> {
        self.principals
            .read(|map| map.values().find(|p| &p.email == email).cloned())
    }

    /// All principals of `kind`, ordered by id.
    pub fn list(&self, kind: PrincipalKind) -> Vec<Principal> {
        let mut all = self.principals.filter(|p| p.kind == kind);
        all.sort_by_key(|p| p.numeric_id);
        all
    }

    /// Number of principals of `kind`.
    pub fn count(&self, kind: PrincipalKind) -> usize {
        self.principals
            .read(|map| map.keys().filter(|(k, _)| *k == kind).count())
    }

    /// Apply a partial profile update under the same uniqueness rules.
    pub fn update_profile(
        &self,
        kind: PrincipalKind,
        id: NumericId,
        update: ProfileUpdate,
    ) -> MessResult<Principal> {
        let mut errors = ValidationErrors::new();
        let name = update.name.and_then(|n| checked_name(n, &mut errors));
        let email = update
            .email
            .and_then(|e| checked_email(&e, &mut errors));
        let credential = update
            .credential
            .and_then(|c| checked_credential(c, &mut errors));
        errors.into_result()?;

        let credential_hash = credential.map(|c| self.hasher.hash(&c));
        let now = self.clock.now();

        let updated = self.principals.write(|map| {
            if let Some(email) = &email {
                let taken = map
                    .iter()
                    .any(|(key, p)| *key != (kind, id) && &p.email == email);
                if taken {
                    return Err(MessError::Conflict("email is already registered".into()));
                }
            }
            let principal = map
                .get_mut(&(kind, id))
                .ok_or_else(|| MessError::NotFound(format!("{kind} {id}")))?;
            if let Some(name) = name {
                principal.name = name;
            }
            if let Some(email) = email {
                principal.email = email;
            }
            if let Some(hash) = credential_hash {
                principal.credential_hash = hash;
            }
            principal.updated_at = now;
            Ok(principal.clone())
        })?;

        tracing::info!(kind = %kind, numeric_id = %id, "profile updated");
        Ok(updated)
    }

    /// Remove a principal.
    pub fn delete(&self, kind: PrincipalKind, id: NumericId) -> MessResult<Principal> {
        let removed = self
            .principals
            .remove(&(kind, id))
            .ok_or_else(|| MessError::NotFound(format!("{kind} {id}")))?;
        tracing::info!(kind = %kind, numeric_id = %id, "principal deleted");
        Ok(removed)
    }

    /// Load a persisted principal without re-validating it.
    pub fn restore(&self, principal: Principal) {
        self.principals
            .insert((principal.kind, principal.numeric_id), principal);
    }
}

impl StudentDirectory for IdentityRegistry {
    fn student_exists(&self, id: NumericId) -> bool {
        self.principals.contains(&(PrincipalKind::Student, id))
    }
}

fn checked_name(name: String, errors: &mut ValidationErrors) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        errors.push("name", "must not be blank");
        None
    } else if trimmed.chars().count() > MAX_NAME_CHARS {
        errors.push("name", format!("must be at most {MAX_NAME_CHARS} characters"));
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn checked_id(id: i64, errors: &mut ValidationErrors) -> Option<NumericId> {
    match NumericId::new(id) {
        Ok(id) => Some(id),
        Err(_) => {
            errors.push("numericId", "must be a positive integer");
            None
        }
    }
}

fn checked_email(raw: &str, errors: &mut ValidationErrors) -> Option<Email> {
    match Email::parse(raw) {
        Ok(email) => Some(email),
        Err(_) => {
            errors.push("email", "is not a valid address");
            None
        }
    }
}

fn checked_credential(credential: Credential, errors: &mut ValidationErrors) -> Option<Credential> {
    let chars = credential.char_count();
    if !(MIN_CREDENTIAL_CHARS..=MAX_CREDENTIAL_CHARS).contains(&chars) {
        errors.push(
            "credential",
            format!("must be {MIN_CREDENTIAL_CHARS} to {MAX_CREDENTIAL_CHARS} characters"),
        );
        None
    } else {
        Some(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mess_core::SystemClock;
    use mess_crypto::Sha256CredentialHasher;

    fn registry() -> IdentityRegistry {
        IdentityRegistry::new(
            Arc::new(Sha256CredentialHasher::with_iterations(4)),
            Arc::new(SystemClock),
        )
    }

    fn registration(id: i64, email: &str) -> Registration {
        Registration {
            name: Some("Asha Rao".into()),
            numeric_id: Some(id),
            email: Some(email.into()),
            credential: Some(Credential::new("hunter22")),
        }
    }

    #[test]
    fn register_normalizes_email() {
        let reg = registry();
        let p = reg
            .register(PrincipalKind::Student, registration(101, " Asha@Campus.EDU "))
            .unwrap();
        assert_eq!(p.email.as_str(), "asha@campus.edu");
        assert!(reg.student_exists(NumericId::new(101).unwrap()));
    }

    #[test]
    fn register_reports_every_invalid_field() {
        let err = registry()
            .register(
                PrincipalKind::Student,
                Registration {
                    name: Some("  ".into()),
                    numeric_id: Some(0),
                    email: None,
                    credential: Some(Credential::new("abc")),
                },
            )
            .unwrap_err();
        let MessError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.fields(), vec!["name", "numericId", "email", "credential"]);
    }

    #[test]
    fn numeric_id_unique_within_kind_only() {
        let reg = registry();
        reg.register(PrincipalKind::Student, registration(7, "a@campus.edu"))
            .unwrap();
        let dup = reg.register(PrincipalKind::Student, registration(7, "b@campus.edu"));
        assert!(matches!(dup, Err(MessError::Conflict(_))));
        reg.register(PrincipalKind::MessStaff, registration(7, "c@campus.edu"))
            .unwrap();
    }

    #[test]
    fn email_unique_across_kinds() {
        let reg = registry();
        reg.register(PrincipalKind::Student, registration(1, "same@campus.edu"))
            .unwrap();
        let err = reg
            .register(PrincipalKind::Admin, registration(2, "SAME@campus.edu"))
            .unwrap_err();
        assert!(matches!(err, MessError::Conflict(_)));
    }

    #[test]
    fn authenticate_accepts_right_pair_only() {
        let reg = registry();
        reg.register(PrincipalKind::Student, registration(101, "s@campus.edu"))
            .unwrap();
        let ok = reg
            .authenticate("S@campus.edu", &Credential::new("hunter22"), PrincipalKind::Student)
            .unwrap();
        assert_eq!(ok.numeric_id.value(), 101);

        for (email, cred, kind) in [
            ("s@campus.edu", "wrong-pass", PrincipalKind::Student),
            ("nobody@campus.edu", "hunter22", PrincipalKind::Student),
            ("s@campus.edu", "hunter22", PrincipalKind::Admin),
            ("not-an-email", "hunter22", PrincipalKind::Student),
        ] {
            let err = reg
                .authenticate(email, &Credential::new(cred), kind)
                .unwrap_err();
            assert_eq!(err, MessError::Unauthorized);
        }
    }

    #[test]
    fn update_profile_checks_email_uniqueness() {
        let reg = registry();
        reg.register(PrincipalKind::Student, registration(1, "one@campus.edu"))
            .unwrap();
        reg.register(PrincipalKind::MessStaff, registration(2, "two@campus.edu"))
            .unwrap();
        let id = NumericId::new(1).unwrap();

        let clash = reg.update_profile(
            PrincipalKind::Student,
            id,
            ProfileUpdate {
                email: Some("two@campus.edu".into()),
                ..Default::default()
            },
        );
        assert!(matches!(clash, Err(MessError::Conflict(_))));

        // Re-submitting one's own email is not a clash.
        let same = reg
            .update_profile(
                PrincipalKind::Student,
                id,
                ProfileUpdate {
                    name: Some("New Name".into()),
                    email: Some("one@campus.edu".into()),
                    credential: Some(Credential::new("another-pass")),
                },
            )
            .unwrap();
        assert_eq!(same.name, "New Name");
        assert!(reg
            .authenticate("one@campus.edu", &Credential::new("another-pass"), PrincipalKind::Student)
            .is_ok());
    }

    #[test]
    fn delete_then_find_is_not_found() {
        let reg = registry();
        reg.register(PrincipalKind::Admin, registration(9, "root@campus.edu"))
            .unwrap();
        let id = NumericId::new(9).unwrap();
        reg.delete(PrincipalKind::Admin, id).unwrap();
        assert!(matches!(reg.find(PrincipalKind::Admin, id), Err(MessError::NotFound(_))));
        assert!(matches!(reg.delete(PrincipalKind::Admin, id), Err(MessError::NotFound(_))));
    }

    #[test]
    fn list_is_ordered_and_scoped() {
        let reg = registry();
        reg.register(PrincipalKind::Student, registration(3, "c@campus.edu")).unwrap();
        reg.register(PrincipalKind::Student, registration(1, "a@campus.edu")).unwrap();
        reg.register(PrincipalKind::Admin, registration(2, "b@campus.edu")).unwrap();
        let ids: Vec<i64> = reg
            .list(PrincipalKind::Student)
            .iter()
            .map(|p| p.numeric_id.value())
            .collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(reg.count(PrincipalKind::Admin), 1);
    }

    #[test]
    fn concurrent_registration_keeps_email_unique() {
        let reg = registry();
        let outcomes: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (1..=8)
                .map(|i| {
                    let reg = reg.clone();
                    s.spawn(move || {
                        reg.register(PrincipalKind::Student, registration(i, "race@campus.edu"))
                            .is_ok()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        assert_eq!(reg.count(PrincipalKind::Student), 1);
    }
}
