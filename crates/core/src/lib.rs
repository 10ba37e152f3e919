//! Core types and traits for kvprobe
//!
//! This crate defines the capability contract every backend under test must
//! satisfy, plus the small set of types shared by the storage fixtures and
//! the harness:
//! - Backend / Store / Batch / Cursor: the adapter contract
//! - StoreError: one variant per contract error class
//! - Entry: a generated key/value pair

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use traits::{Backend, Batch, Cursor, Store};
pub use types::Entry;
