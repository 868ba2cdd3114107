//! Cryptographically secure random generation.
//!
//! Protocol identifiers are drawn through the [`SecureRandom`] capability so
//! callers can pass a deterministic source in tests instead of relying on
//! ambient state.

use std::sync::{Mutex, PoisonError};

use rand::distr::{Alphanumeric, SampleString};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Source of random alphanumeric tokens.
pub trait SecureRandom: Send + Sync {
    /// Returns `len` characters drawn uniformly from `[A-Za-z0-9]`.
    fn alphanumeric(&self, len: usize) -> String;
}

/// Generates a cryptographically secure random string.
///
/// The string contains alphanumeric characters (a-z, A-Z, 0-9). A 32
/// character token carries roughly 190 bits of entropy (log2(62^32)).
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// The operating system backed generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRandom;

impl SecureRandom for SystemRandom {
    fn alphanumeric(&self, len: usize) -> String {
        random_alphanumeric(len)
    }
}

/// A deterministic generator seeded by the caller.
///
/// # Warning
///
/// NOT cryptographically secure. Use only in tests.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Creates a generator from a 32-byte seed.
    #[must_use]
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_seed(seed)),
        }
    }
}

impl SecureRandom for SeededRandom {
    fn alphanumeric(&self, len: usize) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        Alphanumeric.sample_string(&mut *rng, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn random_alphanumeric_produces_correct_length() {
        assert_eq!(random_alphanumeric(16).len(), 16);
        assert_eq!(random_alphanumeric(32).len(), 32);
        assert_eq!(random_alphanumeric(64).len(), 64);
    }

    #[test]
    fn random_alphanumeric_only_contains_valid_chars() {
        let s = random_alphanumeric(1000);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn system_random_uniqueness() {
        let tokens: HashSet<String> = (0..1000).map(|_| SystemRandom.alphanumeric(32)).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn seeded_random_is_deterministic() {
        let a = SeededRandom::new([42u8; 32]);
        let b = SeededRandom::new([42u8; 32]);
        assert_eq!(a.alphanumeric(32), b.alphanumeric(32));
        assert_eq!(a.alphanumeric(32), b.alphanumeric(32));
    }

    #[test]
    fn seeded_random_advances() {
        let rng = SeededRandom::new([7u8; 32]);
        assert_ne!(rng.alphanumeric(32), rng.alphanumeric(32));
    }

    #[test]
    fn different_seeds_produce_different_values() {
        let a = SeededRandom::new([1u8; 32]).alphanumeric(32);
        let b = SeededRandom::new([2u8; 32]).alphanumeric(32);
        assert_ne!(a, b);
    }
}
