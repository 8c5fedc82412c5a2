//! 워크플로 스테이지 드라이버
//!
//! 워크플로를 Proposal부터 Teardown까지 순서대로 진행시키고, 각 스테이지에서
//! 컨트롤러가 보고한 상태를 폴링합니다.
//!
//! # 스테이지 처리 순서
//!
//! 1. 스테이지에 설정된 지연 시간을 모두 대기
//! 2. Setup이면 컴퓨트/서버 배정
//! 3. desired state 기록 (Proposal은 생성 시 기록되므로 대기만 함)
//! 4. ExpectError 대상 스테이지면 `Error` 상태를 60초 동안 대기하고 종료
//! 5. 아니면 스테이지 타임아웃 안에 `ready=true, status=Completed` 대기
//! 6. DataOut이면 copy-out 검증
//! 7. StopAfter 대상 스테이지면 종료

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use flowtest_core::metrics as m;
use flowtest_core::resources::{Resource, Workflow, WorkflowStatus};
use flowtest_core::stage::Stage;
use metrics::{counter, histogram};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::allocator::assign_resources;
use crate::case::TestCase;
use crate::error::{Expectation, HarnessError, Observed};
use crate::helper::verify_copy_out;
use crate::run_config::{EXPECT_ERROR_TIMEOUT, RUN_ID_LABEL, RunConfig};
use crate::store::ResourceStore;
use crate::wait::poll_until;

/// Attempts at writing the desired state before a conflict becomes fatal.
const MAX_UPDATE_ATTEMPTS: u32 = 5;

/// What a stage does besides waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageHandler {
    /// Desired state was written at creation; only wait.
    WaitOnly,
    /// Assign computes and servers, then advance.
    AssignThenAdvance,
    Advance,
    /// Advance, then verify copy-out.
    AdvanceThenVerify,
}

/// Stages in execution order with their handlers.
const STAGE_TABLE: [(Stage, StageHandler); 7] = [
    (Stage::Proposal, StageHandler::WaitOnly),
    (Stage::Setup, StageHandler::AssignThenAdvance),
    (Stage::DataIn, StageHandler::Advance),
    (Stage::PreRun, StageHandler::Advance),
    (Stage::PostRun, StageHandler::Advance),
    (Stage::DataOut, StageHandler::AdvanceThenVerify),
    (Stage::Teardown, StageHandler::Advance),
];

/// How execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "stage", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// All seven stages completed.
    Completed,
    StoppedAfter(Stage),
    /// The expected `Error` was observed.
    ExpectedError(Stage),
}

/// One stage the driver drove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageVisit {
    pub stage: Stage,
    /// Time from the stage's first action until the awaited status.
    pub elapsed: Duration,
}

/// Result of [`StateDriver::execute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub visited: Vec<StageVisit>,
    pub outcome: ExecutionOutcome,
}

impl ExecutionReport {
    /// Last stage that reached its awaited status.
    pub fn last_stage(&self) -> Option<Stage> {
        self.visited.last().map(|v| v.stage)
    }
}

/// Drives one case's workflow through the stages.
pub struct StateDriver<'a, S> {
    store: &'a S,
    run: &'a RunConfig,
}

impl<'a, S: ResourceStore> StateDriver<'a, S> {
    pub fn new(store: &'a S, run: &'a RunConfig) -> Self {
        Self { store, run }
    }

    /// Creates the case's workflow in Proposal, labelled with the run id.
    pub async fn create_workflow(&self, case: &mut TestCase) -> Result<(), HarnessError> {
        let workflow = case.workflow_mut();
        workflow
            .metadata
            .labels
            .insert(RUN_ID_LABEL.to_owned(), self.run.run_id.clone());
        workflow.spec.desired_state = Stage::Proposal;

        let created = self.store.create(&*workflow).await?;
        info!(workflow = %created.key(), "created workflow");
        *case.workflow_mut() = created;
        Ok(())
    }

    /// Runs the stage table against an already-created workflow.
    pub async fn execute(&self, case: &mut TestCase) -> Result<ExecutionReport, HarnessError> {
        let mut visited = Vec::new();
        let outcome = self.run_stages(case, &mut visited).await?;
        Ok(ExecutionReport { visited, outcome })
    }

    /// Like [`execute`](Self::execute), but stages reached before an error
    /// stay in `visited`.
    pub async fn run_stages(
        &self,
        case: &mut TestCase,
        visited: &mut Vec<StageVisit>,
    ) -> Result<ExecutionOutcome, HarnessError> {
        for (stage, handler) in STAGE_TABLE {
            let delays: Vec<Duration> = case.options().delays_for(stage).collect();
            for delay in delays {
                debug!(workflow = case.workflow_name(), %stage, ?delay, "delaying stage");
                tokio::time::sleep(delay).await;
            }

            let started = Instant::now();
            if handler == StageHandler::AssignThenAdvance {
                assign_resources(self.store, self.run, case).await?;
            }
            if handler != StageHandler::WaitOnly {
                self.set_desired_state(case, stage).await?;
            }

            if case.options().expect_error == Some(stage) {
                self.wait_for(case, stage, Expectation::Error, EXPECT_ERROR_TIMEOUT)
                    .await?;
                visited.push(StageVisit {
                    stage,
                    elapsed: started.elapsed(),
                });
                return Ok(ExecutionOutcome::ExpectedError(stage));
            }

            let timeout = self.stage_timeout(case, stage);
            self.wait_for(case, stage, Expectation::Ready, timeout)
                .await?;

            if handler == StageHandler::AdvanceThenVerify {
                verify_copy_out(self.store, self.run, case).await?;
            }

            visited.push(StageVisit {
                stage,
                elapsed: started.elapsed(),
            });

            if case.options().stop_after == Some(stage) {
                info!(workflow = case.workflow_name(), %stage, "stopping after stage");
                return Ok(ExecutionOutcome::StoppedAfter(stage));
            }
        }

        Ok(ExecutionOutcome::Completed)
    }

    /// Advances to `stage` and waits for it to complete.
    pub async fn advance_and_wait(
        &self,
        case: &mut TestCase,
        stage: Stage,
    ) -> Result<(), HarnessError> {
        self.set_desired_state(case, stage).await?;
        let timeout = self.stage_timeout(case, stage);
        self.wait_for(case, stage, Expectation::Ready, timeout).await
    }

    fn stage_timeout(&self, case: &TestCase, stage: Stage) -> Duration {
        let options = case.options();
        self.run
            .stage_timeout(stage, options.low_timeout, options.high_timeout)
    }

    /// Writes `stage` as the desired state, re-reading on conflict.
    async fn set_desired_state(&self, case: &mut TestCase, stage: Stage) -> Result<(), HarnessError> {
        let key = case.workflow_key();
        info!(workflow = %key, %stage, "advancing workflow");

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut workflow: Workflow = self.store.get(&key).await?;
            workflow.spec.desired_state = stage;
            match self.store.update(&workflow).await {
                Ok(updated) => {
                    *case.workflow_mut() = updated;
                    return Ok(());
                }
                Err(e) if e.is_conflict() && attempt < MAX_UPDATE_ATTEMPTS => {
                    debug!(workflow = %key, attempt, "desired state write conflicted, retrying");
                    tokio::time::sleep(self.run.poll_interval).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Polls until the workflow reports `expected` in `stage`.
    async fn wait_for(
        &self,
        case: &mut TestCase,
        stage: Stage,
        expected: Expectation,
        timeout: Duration,
    ) -> Result<(), HarnessError> {
        let key = case.workflow_key();
        let started = Instant::now();
        let store = self.store;
        // Latest workflow read and the last status the controller reported.
        let seen: Mutex<(Option<Workflow>, Option<WorkflowStatus>)> = Mutex::default();

        let reached = poll_until(timeout, self.run.poll_interval, || {
            let (key, seen) = (&key, &seen);
            async move {
                let workflow: Workflow = store.get(key).await?;
                let matched = workflow.status.as_ref().is_some_and(|status| match expected {
                    Expectation::Ready => status.is_completed_in(stage),
                    Expectation::Error => status.is_errored_in(stage),
                });
                if matched {
                    return Ok(Some(workflow));
                }
                let mut seen = seen.lock().unwrap_or_else(PoisonError::into_inner);
                if workflow.status.is_some() {
                    seen.1 = workflow.status.clone();
                }
                seen.0 = Some(workflow);
                Ok(None)
            }
        })
        .await?;

        if let Some(workflow) = reached {
            *case.workflow_mut() = workflow;
            let elapsed = started.elapsed();
            info!(workflow = %key, %stage, %expected, ?elapsed, "stage reached");
            counter!(m::STAGE_TRANSITIONS_TOTAL, m::LABEL_STAGE => stage.as_str(), m::LABEL_RESULT => expected.to_string())
                .increment(1);
            histogram!(m::STAGE_DURATION_SECONDS, m::LABEL_STAGE => stage.as_str())
                .record(elapsed.as_secs_f64());
            return Ok(());
        }

        let (latest, last) = seen.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Some(workflow) = latest {
            *case.workflow_mut() = workflow;
        }
        let last_observed = Observed(last);
        warn!(workflow = %key, %stage, %expected, ?timeout, %last_observed, "stage timed out");
        counter!(m::STAGE_TIMEOUTS_TOTAL, m::LABEL_STAGE => stage.as_str()).increment(1);
        counter!(m::STAGE_TRANSITIONS_TOTAL, m::LABEL_STAGE => stage.as_str(), m::LABEL_RESULT => "timeout")
            .increment(1);
        Err(HarnessError::StageTimeout {
            workflow: key.to_string(),
            stage,
            expected,
            timeout,
            last_observed,
        })
    }
}
