//! 단일 케이스 실행
//!
//! Prepare → 워크플로 생성 → Execute → (Teardown + 삭제) → Cleanup 순서로
//! 하나의 케이스를 실행하고 [`CaseReport`]를 만듭니다. 실패는 보고서에
//! 기록될 뿐 호출자에게 전파되지 않습니다.

use std::time::Duration;

use flowtest_core::metrics as m;
use flowtest_core::resources::Workflow;
use flowtest_core::stage::Stage;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::case::TestCase;
use crate::driver::{ExecutionOutcome, ExecutionReport, StageVisit, StateDriver};
use crate::error::{Expectation, HarnessError};
use crate::preparer::{PrepareOutcome, cleanup, prepare};
use crate::run_config::{DELETION_TIMEOUT, RunConfig};
use crate::store::{ResourceStore, delete_and_wait};

/// Overall verdict of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseResult {
    Passed,
    Failed,
    Skipped,
}

impl CaseResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Kinds of checks recorded for a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssertionKind {
    /// The workflow reported `Completed` in the stage.
    StageReached,
    /// The workflow did not reach the stage in time.
    StageTimeout,
    /// The workflow reported the expected `Error` in the stage.
    ExpectedErrorReached,
    /// The workflow was deleted after teardown.
    DeletionConfirmed,
}

/// One pass/fail check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assertion {
    pub kind: AssertionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Assertion {
    fn pass(kind: AssertionKind, stage: Option<Stage>) -> Self {
        Self {
            kind,
            stage,
            passed: true,
            detail: None,
        }
    }

    fn fail(kind: AssertionKind, stage: Option<Stage>, detail: String) -> Self {
        Self {
            kind,
            stage,
            passed: false,
            detail: Some(detail),
        }
    }
}

/// Everything observed while running one case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub name: String,
    pub workflow: String,
    pub labels: Vec<String>,
    pub result: CaseResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub assertions: Vec<Assertion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionReport>,
    /// First error from preparation or execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_error: Option<String>,
    pub duration: Duration,
}

impl CaseReport {
    fn new(case: &TestCase) -> Self {
        Self {
            name: case.name().to_owned(),
            workflow: case.workflow_name().to_owned(),
            labels: case.labels().to_vec(),
            result: CaseResult::Passed,
            skip_reason: None,
            assertions: Vec::new(),
            execution: None,
            error: None,
            cleanup_error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn passed(&self) -> bool {
        self.result == CaseResult::Passed
    }

    pub fn failed(&self) -> bool {
        self.result == CaseResult::Failed
    }

    fn settle(&mut self) {
        if self.result == CaseResult::Skipped {
            return;
        }
        let failed = self.error.is_some()
            || self.cleanup_error.is_some()
            || self.assertions.iter().any(|a| !a.passed);
        self.result = if failed {
            CaseResult::Failed
        } else {
            CaseResult::Passed
        };
    }
}

/// Runs one case end to end.
///
/// Cleanup always runs once preparation has started, even after failures.
pub async fn run_case<S: ResourceStore>(
    store: &S,
    run: &RunConfig,
    mut case: TestCase,
) -> CaseReport {
    let started = Instant::now();
    let mut report = CaseReport::new(&case);
    gauge!(m::CASES_RUNNING).increment(1.0);
    info!(test = case.name(), workflow = case.workflow_name(), "running test");

    match prepare(store, run, &mut case).await {
        Ok(PrepareOutcome::Skipped { reason }) => {
            report.result = CaseResult::Skipped;
            report.skip_reason = Some(reason);
        }
        Ok(PrepareOutcome::Ready) => {
            if let Err(e) = drive(store, run, &mut case, &mut report).await {
                error!(test = case.name(), error = %e, "test failed");
                report.error = Some(e.to_string());
            }
        }
        Err(e) => {
            error!(test = case.name(), error = %e, "preparation failed");
            report.error = Some(e.to_string());
        }
    }

    if report.result != CaseResult::Skipped {
        if let Err(e) = cleanup(store, run, &mut case).await {
            warn!(test = case.name(), error = %e, "cleanup failed");
            report.cleanup_error = Some(e.to_string());
        }
    }

    report.settle();
    report.duration = started.elapsed();

    gauge!(m::CASES_RUNNING).decrement(1.0);
    counter!(m::CASES_TOTAL, m::LABEL_RESULT => report.result.as_str()).increment(1);
    histogram!(m::CASE_DURATION_SECONDS).record(report.duration.as_secs_f64());
    info!(
        test = %report.name,
        result = report.result.as_str(),
        duration = ?report.duration,
        "test finished"
    );
    report
}

/// Creates, executes and (if asked) tears down the workflow.
async fn drive<S: ResourceStore>(
    store: &S,
    run: &RunConfig,
    case: &mut TestCase,
    report: &mut CaseReport,
) -> Result<(), HarnessError> {
    let driver = StateDriver::new(store, run);
    driver.create_workflow(case).await?;

    let mut visited = Vec::new();
    let outcome = match driver.run_stages(case, &mut visited).await {
        Ok(outcome) => outcome,
        Err(e) => {
            record_visits(report, &visited, None);
            record_failure(report, &e);
            return Err(e);
        }
    };
    record_visits(report, &visited, Some(outcome));
    report.execution = Some(ExecutionReport { visited, outcome });

    if !case.should_teardown() {
        return Ok(());
    }

    if outcome != ExecutionOutcome::Completed {
        if let Err(e) = driver.advance_and_wait(case, Stage::Teardown).await {
            record_failure(report, &e);
            return Err(e);
        }
        report
            .assertions
            .push(Assertion::pass(AssertionKind::StageReached, Some(Stage::Teardown)));
    }

    let deleted = delete_and_wait::<S, Workflow>(
        store,
        &case.workflow_key(),
        DELETION_TIMEOUT,
        run.poll_interval,
    )
    .await;
    match deleted {
        Ok(()) => {
            report
                .assertions
                .push(Assertion::pass(AssertionKind::DeletionConfirmed, None));
            Ok(())
        }
        Err(e) => {
            report.assertions.push(Assertion::fail(
                AssertionKind::DeletionConfirmed,
                None,
                e.to_string(),
            ));
            Err(e)
        }
    }
}

fn record_visits(
    report: &mut CaseReport,
    visited: &[StageVisit],
    outcome: Option<ExecutionOutcome>,
) {
    for visit in visited {
        let kind = match outcome {
            Some(ExecutionOutcome::ExpectedError(stage)) if stage == visit.stage => {
                AssertionKind::ExpectedErrorReached
            }
            _ => AssertionKind::StageReached,
        };
        report.assertions.push(Assertion::pass(kind, Some(visit.stage)));
    }
}

fn record_failure(report: &mut CaseReport, error: &HarnessError) {
    if let HarnessError::StageTimeout {
        stage, expected, ..
    } = error
    {
        let kind = match expected {
            Expectation::Ready => AssertionKind::StageTimeout,
            Expectation::Error => AssertionKind::ExpectedErrorReached,
        };
        report
            .assertions
            .push(Assertion::fail(kind, Some(*stage), error.to_string()));
    }
}
