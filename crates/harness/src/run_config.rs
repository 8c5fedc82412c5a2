//! Run-wide settings fixed for the duration of a run.

use std::time::Duration;

use flowtest_core::config::FlowtestConfig;
use flowtest_core::error::ConfigError;
use flowtest_core::stage::Stage;

/// Fixed bound for waiting on an expected `Error` outcome.
pub const EXPECT_ERROR_TIMEOUT: Duration = Duration::from_secs(60);

/// Bound for an object to disappear after deletion.
pub const DELETION_TIMEOUT: Duration = Duration::from_secs(120);

/// Bound for a helper pod to reach `Succeeded`.
pub const HELPER_TIMEOUT: Duration = Duration::from_secs(60);

/// Bound for a persistent instance's storage to report ready.
pub const STORAGE_READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Bound for a directive breakdown to report ready during Setup.
pub const BREAKDOWN_READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Poll granularity of every bounded wait.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Label stamped on every workflow a run creates.
pub const RUN_ID_LABEL: &str = "flowtest.io/run-id";

/// Settings threaded through preparation and execution.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Timeout for stages outside `high_stages`.
    pub low_timeout: Duration,
    /// Timeout for stages in `high_stages`.
    pub high_timeout: Duration,
    pub high_stages: Vec<Stage>,
    /// `false` skips hardware-required cases.
    pub hardware_available: bool,
    /// Full helper image reference, `image:tag`.
    pub helper_image: String,
    pub run_id: String,
    pub poll_interval: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            low_timeout: Duration::from_secs(5 * 60),
            high_timeout: Duration::from_secs(15 * 60),
            high_stages: vec![Stage::Setup, Stage::Teardown],
            hardware_available: true,
            helper_image: "ghcr.io/nearnodeflash/nnf-integration-test-helper:latest".to_owned(),
            run_id: uuid::Uuid::new_v4().to_string(),
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl RunConfig {
    /// Builds the run settings from loaded configuration with a fresh run id.
    pub fn from_config(config: &FlowtestConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            low_timeout: config.timeouts.low()?,
            high_timeout: config.timeouts.high()?,
            high_stages: config.timeouts.high_stages()?,
            helper_image: config.helper.image_ref(),
            ..Self::default()
        })
    }

    pub fn with_hardware_available(mut self, available: bool) -> Self {
        self.hardware_available = available;
        self
    }

    /// Timeout tier for `stage`, honouring per-case overrides.
    pub fn stage_timeout(
        &self,
        stage: Stage,
        low_override: Option<Duration>,
        high_override: Option<Duration>,
    ) -> Duration {
        if self.high_stages.contains(&stage) {
            high_override.unwrap_or(self.high_timeout)
        } else {
            low_override.unwrap_or(self.low_timeout)
        }
    }
}
