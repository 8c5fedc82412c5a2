//! Workflow stages and status outcomes.
//!
//! A workflow walks the seven [`Stage`]s in the fixed order given by
//! [`Stage::ALL`]; there is no other path. [`Outcome`] is the controller's
//! report for the stage it currently holds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle stage of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Proposal,
    Setup,
    DataIn,
    PreRun,
    PostRun,
    DataOut,
    Teardown,
}

impl Stage {
    /// All stages in transition order.
    pub const ALL: [Stage; 7] = [
        Stage::Proposal,
        Stage::Setup,
        Stage::DataIn,
        Stage::PreRun,
        Stage::PostRun,
        Stage::DataOut,
        Stage::Teardown,
    ];

    /// Stable name, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposal => "Proposal",
            Self::Setup => "Setup",
            Self::DataIn => "DataIn",
            Self::PreRun => "PreRun",
            Self::PostRun => "PostRun",
            Self::DataOut => "DataOut",
            Self::Teardown => "Teardown",
        }
    }

    /// Position in [`Stage::ALL`].
    pub fn index(&self) -> usize {
        match self {
            Self::Proposal => 0,
            Self::Setup => 1,
            Self::DataIn => 2,
            Self::PreRun => 3,
            Self::PostRun => 4,
            Self::DataOut => 5,
            Self::Teardown => 6,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    /// Accepts the canonical name case-insensitively (`prerun`, `PreRun`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown stage '{s}', expected one of: {}",
                    Stage::ALL.map(|stage| stage.as_str()).join(", ")
                )
            })
    }
}

/// Status the controller reports for the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Outcome {
    #[default]
    Pending,
    Queued,
    Running,
    Completed,
    TransientCondition,
    Error,
    DriverWait,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Queued => "Queued",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::TransientCondition => "TransientCondition",
            Self::Error => "Error",
            Self::DriverWait => "DriverWait",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}
