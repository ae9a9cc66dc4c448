//! Integration test infrastructure for nbsync.
//!
//! Provides:
//! - An in-memory directory environment with per-test configuration files
//! - Snapshot fixtures for common device shapes
//! - Directory and report verification helpers

mod env;
pub mod fixtures;
mod verification;

pub use env::{init_test_logging, TestEnv};
pub use fixtures::*;
pub use verification::*;
