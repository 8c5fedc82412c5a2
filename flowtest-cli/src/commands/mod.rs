//! Subcommand handlers

pub mod list;
pub mod run;

use std::path::Path;

use flowtest_core::FlowtestConfig;
use flowtest_core::error::{ConfigError, FlowtestError};
use tracing::debug;

use crate::cli::DEFAULT_CONFIG_PATH;
use crate::error::CliError;

/// Loads `path`, falling back to defaults plus environment overrides when the
/// default file is absent. An explicitly named file must exist.
pub async fn load_config(path: &Path) -> Result<FlowtestConfig, CliError> {
    match FlowtestConfig::load(path).await {
        Ok(config) => Ok(config),
        Err(FlowtestError::Config(ConfigError::FileNotFound { .. }))
            if path == Path::new(DEFAULT_CONFIG_PATH) =>
        {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(FlowtestConfig::from_env()?)
        }
        Err(e) => Err(e.into()),
    }
}
