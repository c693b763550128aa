//! Hash-keyed random draws
//!
//! A draw is a pure function of `(seed, entity_id, year, event_type, salt)`:
//! the key is hashed with SHA-256 and the leading 64 bits are mapped onto
//! [0.0, 1.0). There is no generator state to advance, so draws can be made
//! from any thread in any order and always agree.
//!
//! # Key encoding
//!
//! Every string field is length-prefixed before hashing, so distinct keys can
//! never concatenate to the same byte string (`("ab", "c")` vs `("a", "bc")`).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deterministic random draw service
///
/// # Example
/// ```
/// use workforce_simulator_core_rs::DeterministicRng;
///
/// let rng = DeterministicRng::new(42);
/// let p = rng.draw("E000001", 2026, "termination", "");
/// assert!((0.0..1.0).contains(&p));
/// assert_eq!(p, rng.draw("E000001", 2026, "termination", ""));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeterministicRng {
    seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Raw 64-bit value for the key.
    pub fn draw_u64(&self, entity_id: &str, year: i32, event_type: &str, salt: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        update_field(&mut hasher, entity_id.as_bytes());
        hasher.update(year.to_le_bytes());
        update_field(&mut hasher, event_type.as_bytes());
        update_field(&mut hasher, salt.as_bytes());
        let digest = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix)
    }

    /// Uniform value in [0.0, 1.0) for the key.
    pub fn draw(&self, entity_id: &str, year: i32, event_type: &str, salt: &str) -> f64 {
        let value = self.draw_u64(entity_id, year, event_type, salt);
        // 53 high bits → exact f64 mantissa, strictly below 1.0
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Uniform index in `[0, n)` for the key.
    ///
    /// Returns 0 when `n == 0`.
    pub fn draw_index(
        &self,
        entity_id: &str,
        year: i32,
        event_type: &str,
        salt: &str,
        n: usize,
    ) -> usize {
        if n == 0 {
            return 0;
        }
        let scaled = (self.draw(entity_id, year, event_type, salt) * n as f64) as usize;
        scaled.min(n - 1)
    }
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
