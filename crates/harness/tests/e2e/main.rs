//! E2E tests for flowtest-harness.
//!
//! Cases run against a scripted fake cluster: a [`MemoryStore`] wrapped
//! with a minimal workflow controller that answers desired-state writes,
//! creates breakdowns and storage, and records every write.
//!
//! # Test Structure
//!
//! - `helpers/` -- fake cluster, fixtures
//! - `scenarios/` -- stage driving, expected errors, preparation, cleanup order, suites
//!
//! # Running
//!
//! ```bash
//! cargo test -p flowtest-harness --test e2e
//! ```
//!
//! [`MemoryStore`]: flowtest_harness::MemoryStore

mod helpers;
mod scenarios;
