//! Workload generation
//!
//! Produces random key and value buffers of exact lengths. Content is
//! uniform random and carries no meaning; only the shape matters.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use kvprobe_core::Entry;

/// Random byte source for keys and values
pub struct Workload {
    rng: StdRng,
}

impl Workload {
    /// Seeded from OS entropy
    pub fn new() -> Self {
        Workload {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible sequence for tests
    pub fn seeded(seed: u64) -> Self {
        Workload {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Exactly `len` random bytes
    pub fn generate(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.rng.fill_bytes(&mut buf);
        buf
    }

    /// A fresh entry with the given key and value lengths
    pub fn entry(&mut self, key_len: usize, value_len: usize) -> Entry {
        let key = self.generate(key_len);
        let value = self.generate(value_len);
        Entry::new(key, value)
    }
}

impl Default for Workload {
    fn default() -> Self {
        Self::new()
    }
}
