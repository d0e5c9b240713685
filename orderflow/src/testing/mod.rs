//! Testing utilities for orderflow.
//!
//! - [`fixtures`]: the standard user directory, an in-memory engine harness
//!   and sample orders and component trees
//! - [`mocks`]: stores that fail on demand

pub mod fixtures;
pub mod mocks;

pub use fixtures::TestEngine;
pub use mocks::{ConflictingStore, UnavailableStore};
