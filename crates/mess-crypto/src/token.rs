//! # Token Minting
//!
//! Redemption tokens and session tokens are 32 random bytes from the OS
//! RNG, rendered as 64 lowercase hex characters. The ledger mints through a
//! [`TokenSource`] and retries on the (astronomically unlikely) collision.

use std::collections::VecDeque;

use mess_core::RedemptionToken;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;

/// Random bytes per token.
pub const TOKEN_BYTES: usize = 32;

/// Produce `len` random bytes as lowercase hex.
pub fn random_hex(len: usize) -> String {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    hex_encode(&buf)
}

/// Source of fresh redemption tokens.
pub trait TokenSource: Send + Sync + std::fmt::Debug {
    /// Mint a candidate token. Uniqueness is checked by the caller.
    fn mint(&self) -> RedemptionToken;
}

/// OS-random tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTokenSource;

impl TokenSource for RandomTokenSource {
    fn mint(&self) -> RedemptionToken {
        let mut buf = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut buf);
        RedemptionToken::from(buf)
    }
}

/// Replays a fixed list of tokens, then falls back to random ones.
///
/// Used to force collisions when testing the ledger's retry path.
#[derive(Debug, Default)]
pub struct ScriptedTokenSource {
    queue: Mutex<VecDeque<RedemptionToken>>,
}

impl ScriptedTokenSource {
    /// Source that yields `tokens` in order before switching to random.
    pub fn new(tokens: impl IntoIterator<Item = RedemptionToken>) -> Self {
        Self {
            queue: Mutex::new(tokens.into_iter().collect()),
        }
    }
}

impl TokenSource for ScriptedTokenSource {
    fn mint(&self) -> RedemptionToken {
        let next = self.queue.lock().pop_front();
        next.unwrap_or_else(|| RandomTokenSource.mint())
    }
}

/// Encode bytes as lowercase hex.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decode a hex string into bytes.
pub(crate) fn hex_decode(s: &str) -> Result<Vec<u8>, String> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return Err(format!("hex string has odd length: {}", s.len()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .ok_or_else(|| format!("invalid hex at position {i}"))
                .and_then(|pair| {
                    u8::from_str_radix(pair, 16).map_err(|e| format!("invalid hex at position {i}: {e}"))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_tokens_are_64_hex_chars() {
        let token = RandomTokenSource.mint();
        assert_eq!(token.as_str().len(), 64);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn random_tokens_do_not_repeat() {
        let tokens: HashSet<_> = (0..1000).map(|_| RandomTokenSource.mint()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn scripted_source_replays_then_randomizes() {
        let fixed = RedemptionToken::new("fixed").unwrap();
        let source = ScriptedTokenSource::new([fixed.clone(), fixed.clone()]);
        assert_eq!(source.mint(), fixed);
        assert_eq!(source.mint(), fixed);
        assert_ne!(source.mint(), fixed);
    }

    #[test]
    fn hex_roundtrip() {
        assert_eq!(hex_decode(&hex_encode(&[0xde, 0xad, 0xbe, 0xef])).unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(hex_decode("abc").is_err());
        assert!(hex_decode("zzzz").is_err());
    }
}
