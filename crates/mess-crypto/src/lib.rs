//! # mess-crypto: Credential and Token Primitives
//!
//! - **Credentials** are held in a [`Credential`] value object that zeroizes
//!   on drop and never prints its contents. Persisted credentials are a
//!   [`CredentialHash`] produced by a [`CredentialHasher`]; verification is
//!   constant-time in the digest comparison.
//! - **Tokens** (redemption tokens, session tokens) are 256-bit random values
//!   rendered as lowercase hex. Minting goes through the [`TokenSource`] trait
//!   so the ledger's collision retry can be exercised deterministically.
//!
//! ## Crate Policy
//!
//! - Depends only on `mess-core` internally.
//! - Secrets never implement `Serialize` and never appear in `Debug` output.

pub mod credential;
pub mod token;

pub use credential::{Credential, CredentialError, CredentialHash, CredentialHasher, Sha256CredentialHasher};
pub use token::{random_hex, RandomTokenSource, ScriptedTokenSource, TokenSource};
