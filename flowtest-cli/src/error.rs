//! CLI-specific error types and exit code mapping

use flowtest_core::error::FlowtestError;
use flowtest_harness::HarnessError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure, or a malformed case.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The system is reserved or awaiting triage.
    #[error("system unavailable: {0}")]
    Unavailable(String),

    /// At least one case failed.
    #[error("{failed} of {total} cases failed")]
    CasesFailed { failed: usize, total: usize },

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from flowtest-core.
    #[error("{0}")]
    Core(#[from] FlowtestError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                        |
    /// |------|--------------------------------|
    /// | 0    | Success                        |
    /// | 1    | General / command error        |
    /// | 2    | Configuration error            |
    /// | 3    | System reserved or in triage   |
    /// | 4    | One or more cases failed       |
    /// | 10   | IO error                       |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(FlowtestError::Config(_)) => 2,
            Self::Unavailable(_) => 3,
            Self::CasesFailed { .. } => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

impl From<HarnessError> for CliError {
    fn from(e: HarnessError) -> Self {
        match e {
            HarnessError::TriageRequired { .. } | HarnessError::Reserved { .. } => {
                Self::Unavailable(e.to_string())
            }
            HarnessError::Configuration { .. } => Self::Config(e.to_string()),
            _ => Self::Command(e.to_string()),
        }
    }
}
