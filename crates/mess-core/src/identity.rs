//! # Domain Identity Newtypes
//!
//! Newtype wrappers for the identifiers of the mess backend. They prevent
//! accidental identifier confusion: a [`TransactionId`] cannot be passed
//! where a [`PriceSheetId`] is expected, and a principal's [`NumericId`] is
//! never confused with a storage row key.
//!
//! The principal's `NumericId` is the foreign key used by the ledger and the
//! redemption tracker. It is assigned by the institution (roll number,
//! staff number), not by storage.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MessError;

/// The three disjoint principal kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// A subscriber to meal plans.
    Student,
    /// Mess staff: menus, pricing, redemption desk.
    MessStaff,
    /// Administrator.
    Admin,
}

impl PrincipalKind {
    /// All kinds, in privilege order.
    pub const ALL: [PrincipalKind; 3] = [Self::Student, Self::MessStaff, Self::Admin];

    /// Return the string representation of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::MessStaff => "mess_staff",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrincipalKind {
    type Err = MessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" | "students" => Ok(Self::Student),
            "mess_staff" | "messstaff" | "staff" | "mess-staff" => Ok(Self::MessStaff),
            "admin" | "admins" => Ok(Self::Admin),
            other => Err(MessError::invalid_field(
                "kind",
                format!("unknown principal kind {other:?}"),
            )),
        }
    }
}

/// Institution-assigned numeric identifier of a principal.
///
/// Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NumericId(i64);

impl NumericId {
    /// Create a validated numeric ID.
    pub fn new(value: i64) -> Result<Self, MessError> {
        if value <= 0 {
            return Err(MessError::invalid_field(
                "numericId",
                "must be a positive integer",
            ));
        }
        Ok(Self(value))
    }

    /// The raw value.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for NumericId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NumericId {
    type Err = MessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|_| MessError::invalid_field("numericId", "must be an integer"))?;
        Self::new(value)
    }
}

/// Opaque identifier of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    /// Generate a new random transaction identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a stored price sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceSheetId(pub Uuid);

impl PriceSheetId {
    /// Generate a new random price sheet identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PriceSheetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PriceSheetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque redemption token carried in a QR code.
///
/// Tokens are compared by value only. They are immutable once issued and
/// unique across the ledger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedemptionToken(String);

impl RedemptionToken {
    /// Wrap a token string. Empty or whitespace-bearing strings are rejected.
    pub fn new(token: impl Into<String>) -> Result<Self, MessError> {
        let token = token.into();
        if token.is_empty() || token.chars().any(char::is_whitespace) {
            return Err(MessError::invalid_field(
                "token",
                "must be a non-empty string without whitespace",
            ));
        }
        Ok(Self(token))
    }

    /// The token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<[u8; 32]> for RedemptionToken {
    /// Render 32 random bytes as a 64-character lowercase hex token.
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }
}

impl std::fmt::Display for RedemptionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized email address (trimmed, lower-cased).
///
/// Validation is deliberately shallow: one `@` with non-empty local and
/// domain parts, and a dot in the domain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Parse and normalize an email address.
    pub fn parse(raw: &str) -> Result<Self, MessError> {
        let normalized = raw.trim().to_lowercase();
        let valid = match normalized.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
        if !valid || normalized.chars().any(char::is_whitespace) {
            return Err(MessError::invalid_field("email", "is not a valid address"));
        }
        Ok(Self(normalized))
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_id_rejects_non_positive() {
        assert!(NumericId::new(0).is_err());
        assert!(NumericId::new(-4).is_err());
        assert_eq!(NumericId::new(101).unwrap().value(), 101);
    }

    #[test]
    fn numeric_id_parses_from_path_segment() {
        assert_eq!("101".parse::<NumericId>().unwrap().value(), 101);
        assert!("abc".parse::<NumericId>().is_err());
    }

    #[test]
    fn email_is_normalized() {
        let email = Email::parse("  Asha.Rao@Campus.EDU ").unwrap();
        assert_eq!(email.as_str(), "asha.rao@campus.edu");
    }

    #[test]
    fn email_rejects_malformed() {
        for bad in ["", "no-at-sign", "@campus.edu", "a@", "a@b", "a@@b.c", "a b@c.d", "a@.c"] {
            assert!(Email::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn principal_kind_aliases() {
        assert_eq!("staff".parse::<PrincipalKind>().unwrap(), PrincipalKind::MessStaff);
        assert_eq!("Students".parse::<PrincipalKind>().unwrap(), PrincipalKind::Student);
        assert!("chef".parse::<PrincipalKind>().is_err());
    }

    #[test]
    fn principal_kind_serde_is_snake_case() {
        let json = serde_json::to_string(&PrincipalKind::MessStaff).unwrap();
        assert_eq!(json, "\"mess_staff\"");
    }

    #[test]
    fn token_rejects_blank() {
        assert!(RedemptionToken::new("").is_err());
        assert!(RedemptionToken::new("ab cd").is_err());
        assert_eq!(RedemptionToken::new("abcd").unwrap().as_str(), "abcd");
    }

    #[test]
    fn token_from_bytes_is_lower_hex() {
        let token = RedemptionToken::from([0xabu8; 32]);
        assert_eq!(token.as_str().len(), 64);
        assert!(token.as_str().starts_with("abab"));
    }

    #[test]
    fn transaction_ids_are_distinct() {
        assert_ne!(TransactionId::new(), TransactionId::new());
    }
}
