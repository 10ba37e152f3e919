//! Reference backends for kvprobe
//!
//! These are fixtures for exercising the harness end to end, not storage
//! engines:
//! - MemoryBackend: ordered map with live-view cursors
//! - LogBackend: append-only record file with 32-bit signed length fields
//! - testing::FaultyBackend: fault-injecting wrapper around any backend

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cursor;
pub mod log;
pub mod memory;
pub mod testing;

use std::sync::Arc;

use kvprobe_core::Backend;

pub use log::{LogBackend, LogStore};
pub use memory::{MemoryBackend, MemoryStore};

/// Names accepted by `backend_by_name`
pub const BACKEND_NAMES: &[&str] = &["memory", "log"];

/// Resolve a built-in backend by name
pub fn backend_by_name(name: &str) -> Option<Arc<dyn Backend>> {
    match name {
        "memory" => Some(Arc::new(MemoryBackend::new())),
        "log" => Some(Arc::new(LogBackend::new())),
        _ => None,
    }
}
