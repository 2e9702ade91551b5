//! # Credential Hashing
//!
//! Principals authenticate with an email and a credential. The credential is
//! wrapped in [`Credential`] as soon as it leaves the request body, hashed
//! with a per-principal random salt, and only the [`CredentialHash`] is
//! stored.
//!
//! ## Encoding
//!
//! ```text
//! sha256i$<iterations>$<salt hex, 32 chars>$<digest hex, 64 chars>
//! ```
//!
//! The iteration count travels with the hash so it can be raised without
//! invalidating existing records.

use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::token::{hex_decode, hex_encode};

const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;
const SCHEME: &str = "sha256i";

/// Default work factor for newly hashed credentials.
pub const DEFAULT_ITERATIONS: u32 = 20_000;

/// Errors decoding a stored credential hash.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The encoded string does not have four `$`-separated parts.
    #[error("malformed credential hash")]
    Malformed,

    /// Unknown hashing scheme prefix.
    #[error("unsupported credential scheme {0:?}")]
    UnsupportedScheme(String),

    /// Salt or digest is not valid hex of the right length.
    #[error("invalid credential hash encoding: {0}")]
    InvalidEncoding(String),
}

/// A plaintext credential in transit.
///
/// Zeroized on drop. `Debug` never prints the value.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential(String);

impl Credential {
    /// Wrap a plaintext credential.
    pub fn new(plaintext: impl Into<String>) -> Self {
        Self(plaintext.into())
    }

    /// Borrow the plaintext bytes for hashing.
    pub fn expose_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Number of characters, for length policy checks.
    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

// Deserialize only. A credential is never written back out.
impl<'de> Deserialize<'de> for Credential {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// A salted, iterated digest of a credential.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialHash {
    iterations: u32,
    salt: [u8; SALT_LEN],
    digest: [u8; DIGEST_LEN],
}

impl CredentialHash {
    /// Render in the storage encoding.
    pub fn encode(&self) -> String {
        format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            hex_encode(&self.salt),
            hex_encode(&self.digest)
        )
    }

    /// Parse the storage encoding.
    pub fn parse(encoded: &str) -> Result<Self, CredentialError> {
        let parts: Vec<&str> = encoded.split('$').collect();
        if parts.len() != 4 {
            return Err(CredentialError::Malformed);
        }
        if parts[0] != SCHEME {
            return Err(CredentialError::UnsupportedScheme(parts[0].to_string()));
        }
        let iterations: u32 = parts[1]
            .parse()
            .map_err(|_| CredentialError::InvalidEncoding("iterations".into()))?;
        if iterations == 0 {
            return Err(CredentialError::InvalidEncoding("iterations must be positive".into()));
        }
        let salt_bytes = hex_decode(parts[2]).map_err(CredentialError::InvalidEncoding)?;
        let digest_bytes = hex_decode(parts[3]).map_err(CredentialError::InvalidEncoding)?;
        if salt_bytes.len() != SALT_LEN || digest_bytes.len() != DIGEST_LEN {
            return Err(CredentialError::InvalidEncoding("wrong salt or digest length".into()));
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&salt_bytes);
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&digest_bytes);
        Ok(Self {
            iterations,
            salt,
            digest,
        })
    }

    /// Work factor this hash was produced with.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl std::fmt::Debug for CredentialHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHash")
            .field("iterations", &self.iterations)
            .field("digest", &"[REDACTED]")
            .finish()
    }
}

/// Hashing and verification of credentials.
///
/// Implementations must compare digests in constant time.
pub trait CredentialHasher: Send + Sync + std::fmt::Debug {
    /// Hash a credential with a fresh random salt.
    fn hash(&self, credential: &Credential) -> CredentialHash;

    /// Check a credential against a stored hash.
    fn verify(&self, credential: &Credential, stored: &CredentialHash) -> bool;

    /// Burn the same work as a real verification and return `false`.
    ///
    /// Called when the email is unknown so response time does not reveal
    /// whether the account exists.
    fn verify_dummy(&self, credential: &Credential) -> bool;
}

/// Salted, iterated SHA-256.
#[derive(Debug, Clone, Copy)]
pub struct Sha256CredentialHasher {
    iterations: u32,
}

impl Sha256CredentialHasher {
    /// Hasher with the default work factor.
    pub fn new() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }

    /// Hasher with an explicit work factor (minimum 1).
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    fn derive(iterations: u32, salt: &[u8; SALT_LEN], credential: &Credential) -> [u8; DIGEST_LEN] {
        let mut block = Sha256::new()
            .chain_update(salt)
            .chain_update(credential.expose_bytes())
            .finalize();
        for _ in 1..iterations {
            block = Sha256::new().chain_update(block).chain_update(salt).finalize();
        }
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&block);
        out
    }
}

impl Default for Sha256CredentialHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialHasher for Sha256CredentialHasher {
    fn hash(&self, credential: &Credential) -> CredentialHash {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        CredentialHash {
            iterations: self.iterations,
            salt,
            digest: Self::derive(self.iterations, &salt, credential),
        }
    }

    fn verify(&self, credential: &Credential, stored: &CredentialHash) -> bool {
        let computed = Self::derive(stored.iterations, &stored.salt, credential);
        computed[..].ct_eq(&stored.digest[..]).into()
    }

    fn verify_dummy(&self, credential: &Credential) -> bool {
        let salt = [0u8; SALT_LEN];
        let computed = Self::derive(self.iterations, &salt, credential);
        let _ = computed[..].ct_eq(&[0u8; DIGEST_LEN][..]);
        false
    }
}
