//! Workload entry type

use std::fmt;

/// A generated key/value pair handed straight to a backend
#[derive(Clone, PartialEq, Eq)]
pub struct Entry {
    /// Opaque key bytes
    pub key: Vec<u8>,
    /// Value bytes, possibly hundreds of megabytes
    pub value: Vec<u8>,
}

impl Entry {
    /// Create an entry from owned buffers
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Entry { key, value }
    }

    /// Total payload size in bytes
    pub fn size(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

// Values can be huge; never dump them.
impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key_len", &self.key.len())
            .field("value_len", &self.value.len())
            .finish()
    }
}
