//! Shared E2E test helpers.

pub mod fake_cluster;
pub mod fixtures;
