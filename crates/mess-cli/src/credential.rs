//! # Hash-Credential Subcommand
//!
//! Reads a credential from stdin and prints its encoded salted hash, for
//! provisioning the first admin directly in the `principals` table.

use std::io::Read;

use anyhow::{bail, Context, Result};
use clap::Args;

use mess_crypto::{Credential, CredentialHasher, Sha256CredentialHasher};

/// Arguments for the `mess hash-credential` subcommand.
#[derive(Args, Debug)]
pub struct HashCredentialArgs {
    /// Override the iteration count (testing only).
    #[arg(long, hide = true)]
    pub iterations: Option<u32>,
}

/// Hash the first line read from `input`.
pub fn hash_from_reader(mut input: impl Read, hasher: &dyn CredentialHasher) -> Result<String> {
    let mut raw = String::new();
    input
        .read_to_string(&mut raw)
        .context("failed to read credential from stdin")?;
    let line = raw.lines().next().unwrap_or_default();
    if line.is_empty() {
        bail!("no credential on stdin");
    }
    let credential = Credential::new(line);
    Ok(hasher.hash(&credential).encode())
}

/// Execute the hash-credential subcommand.
pub fn run_hash_credential(args: &HashCredentialArgs) -> Result<u8> {
    let hasher = match args.iterations {
        Some(n) => Sha256CredentialHasher::with_iterations(n),
        None => Sha256CredentialHasher::new(),
    };
    let encoded = hash_from_reader(std::io::stdin().lock(), &hasher)?;
    println!("{encoded}");
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mess_crypto::CredentialHash;

    #[test]
    fn hashes_first_line_and_verifies() {
        let hasher = Sha256CredentialHasher::with_iterations(4);
        let encoded = hash_from_reader("pass1234\nignored\n".as_bytes(), &hasher).unwrap();
        let stored = CredentialHash::parse(&encoded).unwrap();
        assert!(hasher.verify(&Credential::new("pass1234"), &stored));
        assert!(!hasher.verify(&Credential::new("pass12345"), &stored));
    }

    #[test]
    fn empty_input_is_rejected() {
        let hasher = Sha256CredentialHasher::with_iterations(4);
        assert!(hash_from_reader("".as_bytes(), &hasher).is_err());
        assert!(hash_from_reader("\n".as_bytes(), &hasher).is_err());
    }
}
