//! Strong type definitions for the ZeroSync client.
//!
//! Identifiers and counters are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A log generation number.
///
/// All entries written by one productive indexer cycle share a state. The
/// node's current state is the maximum state in its log; an empty log is
/// [`State::ZERO`], so the first generation ever written is `1`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct State(pub u64);

impl State {
    /// The empty-log sentinel.
    pub const ZERO: Self = Self(0);

    /// The generation after this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Raw counter value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for State {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Identity of a remote peer as handed to us by the transport.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    /// Create from any string-like identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random peer identity (16 random bytes, hex).
    pub fn random() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content digest of a file, stored as lowercase hex.
///
/// Produced with Blake3. A record whose content is not known yet carries
/// [`Checksum::zero`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(pub String);

impl Checksum {
    /// Digest a complete byte buffer.
    pub fn of(content: &[u8]) -> Self {
        Self::from_hash(blake3::hash(content))
    }

    /// Wrap a finished Blake3 hash.
    pub fn from_hash(hash: blake3::Hash) -> Self {
        Self(hex::encode(hash.as_bytes()))
    }

    /// Placeholder digest for content that has not been hashed yet.
    pub fn zero() -> Self {
        Self("0".to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == "0"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.0.get(..16).unwrap_or(&self.0);
        f.write_str(short)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_next() {
        assert_eq!(State::ZERO.next(), State(1));
        assert!(State(3) > State(2));
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let a = Checksum::of(b"hello world");
        let b = Checksum::of(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_ne!(a, Checksum::of(b"hello world!"));
    }

    #[test]
    fn test_checksum_zero() {
        assert!(Checksum::zero().is_zero());
        assert!(!Checksum::of(b"").is_zero());
        assert_eq!(format!("{}", Checksum::zero()), "0");
    }

    #[test]
    fn test_random_peer_ids_differ() {
        let a = PeerId::random();
        let b = PeerId::random();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }
}
