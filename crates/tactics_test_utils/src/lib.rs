//! # Tactics Test Utilities
//!
//! Shared testing utilities for the rules engine:
//! - Determinism test harness
//! - Roster and encounter fixtures
//! - Headless AI-vs-AI balance runs
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod balance;
pub mod determinism;
pub mod fixtures;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Re-export proptest for convenience.
pub use proptest;

/// Route engine logs to the test harness output.
///
/// Filtering follows `RUST_LOG`. Safe to call from every test; only the
/// first call installs the subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
