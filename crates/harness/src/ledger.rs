//! Expected-state tracking for a scenario
//!
//! Only keys are kept; values are dropped as soon as the backend accepts
//! them. A sweep is correct when it yields exactly the ledger's keys, in
//! ascending order, once each.

use std::collections::BTreeSet;

/// Keys the backend has acknowledged and not yet deleted
#[derive(Debug, Clone, Default)]
pub struct KeyLedger {
    live: BTreeSet<Vec<u8>>,
}

impl KeyLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an acknowledged write (last write wins on collision)
    pub fn insert(&mut self, key: Vec<u8>) {
        self.live.insert(key);
    }

    /// Record acknowledged writes from a committed batch
    pub fn extend(&mut self, keys: impl IntoIterator<Item = Vec<u8>>) {
        self.live.extend(keys);
    }

    /// Forget a key; `false` if it was not live
    pub fn remove(&mut self, key: &[u8]) -> bool {
        self.live.remove(key)
    }

    /// Whether `key` is live
    pub fn contains(&self, key: &[u8]) -> bool {
        self.live.contains(key)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether no keys are live
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Short hex rendering of a key for error messages
pub fn fmt_key(key: &[u8]) -> String {
    const SHOWN: usize = 8;
    let hex: String = key.iter().take(SHOWN).map(|b| format!("{:02x}", b)).collect();
    if key.len() > SHOWN {
        format!("{}..({} bytes)", hex, key.len())
    } else {
        hex
    }
}
