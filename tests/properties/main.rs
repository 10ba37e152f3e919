//! Cross-crate properties of the harness against the reference backends.
//!
//! Full-size production scenarios are `#[ignore]`d; run them with
//! `cargo test --release -- --ignored`.

mod common;

mod batch_visibility;
mod close_idempotence;
mod deadline_bound;
mod delete_while_iterating;
mod large_values;
mod production_scenarios;
