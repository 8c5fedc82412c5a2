//! 스테이지 구동 시나리오
//!
//! 7개 스테이지 진행, StopAfter, 지연, 충돌 재시도, 타임아웃 보고를 검증합니다.

use std::time::Duration;

use flowtest_core::resources::{
    Computes, ComputesData, DEFAULT_NAMESPACE, ObjectKey, Servers, Workflow,
};
use flowtest_core::stage::Stage;
use flowtest_harness::run_config::RUN_ID_LABEL;
use flowtest_harness::{
    AssertionKind, CaseResult, ExecutionOutcome, ResourceStore, StateDriver, TestCase, run_case,
};

use crate::helpers::fake_cluster::{FakeCluster, Verb};
use crate::helpers::fixtures::{COMPUTE_NODES, RUN_ID, run_config, seeded_cluster};

fn xfs() -> TestCase {
    TestCase::new("XFS", ["#DW jobdw type=xfs name=xfs capacity=1TB"])
}

async fn computes(cluster: &FakeCluster, workflow: &str) -> Computes {
    cluster
        .get(&ObjectKey::new(DEFAULT_NAMESPACE, workflow))
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn simple_case_walks_every_stage_and_deletes_workflow() {
    let cluster = seeded_cluster().await;
    let report = run_case(&cluster, &run_config(), xfs()).await;

    assert_eq!(report.result, CaseResult::Passed, "{:?}", report.error);
    let execution = report.execution.as_ref().unwrap();
    assert_eq!(execution.outcome, ExecutionOutcome::Completed);
    let visited: Vec<Stage> = execution.visited.iter().map(|v| v.stage).collect();
    assert_eq!(visited, Stage::ALL);

    // 생성 시 Proposal, 이후 스테이지마다 한 번씩 기록
    assert_eq!(cluster.stages_written("xfs"), Stage::ALL);
    assert!(!cluster.contains::<Workflow>(DEFAULT_NAMESPACE, "xfs").await);
    assert!(
        report
            .assertions
            .iter()
            .any(|a| a.kind == AssertionKind::DeletionConfirmed && a.passed)
    );

    let assigned = computes(&cluster, "xfs").await;
    assert_eq!(assigned.data.len(), COMPUTE_NODES.len());

    let servers: Servers = cluster
        .get(&ObjectKey::new(DEFAULT_NAMESPACE, "xfs-0"))
        .await
        .unwrap();
    let set = &servers.spec.allocation_sets[0];
    assert_eq!(set.label, "xfs");
    assert_eq!(set.storage.len(), 2);
    assert!(set.storage.iter().all(|s| s.allocation_count == 2));
}

#[tokio::test(start_paused = true)]
async fn stop_after_leaves_workflow_in_place() {
    let cluster = seeded_cluster().await;
    let report = run_case(&cluster, &run_config(), xfs().stop_after(Stage::Setup)).await;

    assert!(report.passed(), "{:?}", report.error);
    assert_eq!(
        report.execution.unwrap().outcome,
        ExecutionOutcome::StoppedAfter(Stage::Setup)
    );
    assert_eq!(cluster.stages_written("xfs"), [Stage::Proposal, Stage::Setup]);
    assert!(cluster.position(Verb::Delete, "Workflow", "xfs").is_none());

    let workflow: Workflow = cluster
        .get(&ObjectKey::new(DEFAULT_NAMESPACE, "xfs"))
        .await
        .unwrap();
    assert_eq!(workflow.metadata.labels[RUN_ID_LABEL], RUN_ID);
    assert!(workflow.status.unwrap().is_completed_in(Stage::Setup));
}

#[tokio::test(start_paused = true)]
async fn external_computes_join_assignment() {
    let cluster = seeded_cluster().await;
    let case = xfs().with_external_computes().stop_after(Stage::Setup);
    let report = run_case(&cluster, &run_config(), case).await;

    assert!(report.passed(), "{:?}", report.error);
    let assigned = computes(&cluster, "xfs").await;
    assert_eq!(assigned.data.len(), COMPUTE_NODES.len() + 1);
    assert_eq!(assigned.data.last().unwrap().name, "external-0");
}

#[tokio::test(start_paused = true)]
async fn prefilled_computes_fail_setup() {
    let cluster = seeded_cluster().await;
    // 다른 주체가 먼저 배정한 상황: 생성 직후 Proposal에서 멈추고 컴퓨트를 채움
    let run = run_config();
    run_case(&cluster, &run, xfs().stop_after(Stage::Proposal)).await;
    cluster
        .store()
        .modify(&ObjectKey::new(DEFAULT_NAMESPACE, "xfs"), |c: &mut Computes| {
            c.data.push(ComputesData {
                name: "intruder".to_owned(),
            });
        })
        .await
        .unwrap();

    let driver = StateDriver::new(&cluster, &run);
    let mut case = xfs();
    let err = driver.execute(&mut case).await.unwrap_err();
    assert!(err.to_string().contains("already has 1 entries"), "{err}");
}

#[tokio::test(start_paused = true)]
async fn stage_delays_all_apply() {
    let cluster = seeded_cluster().await;
    let case = xfs()
        .with_delay(Stage::DataIn, Duration::from_secs(30))
        .with_delay(Stage::DataIn, Duration::from_secs(45));

    let started = tokio::time::Instant::now();
    let report = run_case(&cluster, &run_config(), case).await;

    assert!(report.passed(), "{:?}", report.error);
    assert!(started.elapsed() >= Duration::from_secs(75));
}

#[tokio::test(start_paused = true)]
async fn conflicting_writes_are_retried() {
    let cluster = seeded_cluster().await;
    cluster.conflict_next_updates(3);

    let report = run_case(&cluster, &run_config(), xfs()).await;
    assert!(report.passed(), "{:?}", report.error);
    assert_eq!(cluster.stages_written("xfs"), Stage::ALL);
}

#[tokio::test(start_paused = true)]
async fn persistent_conflicts_fail_the_case() {
    let cluster = seeded_cluster().await;
    cluster.conflict_next_updates(100);

    let report = run_case(&cluster, &run_config(), xfs()).await;
    assert!(report.failed());
    let error = report.error.unwrap();
    assert!(error.contains("conflict updating Workflow"), "{error}");
    assert_eq!(cluster.stages_written("xfs"), [Stage::Proposal]);
}

#[tokio::test(start_paused = true)]
async fn stalled_stage_reports_last_status() {
    let cluster = seeded_cluster().await;
    cluster.stall_in("gfs2", Stage::Setup);
    let case = TestCase::new("GFS2", ["#DW jobdw type=gfs2 name=gfs2 capacity=1TB"])
        .with_timeouts(Duration::from_secs(30), Duration::from_secs(120));

    let report = run_case(&cluster, &run_config(), case).await;

    assert_eq!(report.result, CaseResult::Failed);
    assert!(report.duration >= Duration::from_secs(120));
    let error = report.error.as_deref().unwrap();
    assert!(error.contains("did not become ready in Setup within 120s"), "{error}");
    assert!(error.contains("state=Setup ready=false status=Running"), "{error}");

    let timeout = report
        .assertions
        .iter()
        .find(|a| a.kind == AssertionKind::StageTimeout)
        .unwrap();
    assert_eq!(timeout.stage, Some(Stage::Setup));
    assert!(!timeout.passed);

    // 실패한 워크플로는 점검을 위해 남음
    assert!(cluster.contains::<Workflow>(DEFAULT_NAMESPACE, "gfs2").await);
}

#[tokio::test(start_paused = true)]
async fn stages_reached_before_a_stall_stay_in_the_report() {
    let cluster = seeded_cluster().await;
    cluster.stall_in("xfs", Stage::PreRun);
    let case = xfs().with_timeouts(Duration::from_secs(30), Duration::from_secs(60));

    let report = run_case(&cluster, &run_config(), case).await;
    assert_eq!(report.result, CaseResult::Failed);

    let reached: Vec<Option<Stage>> = report
        .assertions
        .iter()
        .filter(|a| a.kind == AssertionKind::StageReached && a.passed)
        .map(|a| a.stage)
        .collect();
    assert_eq!(
        reached,
        [Some(Stage::Proposal), Some(Stage::Setup), Some(Stage::DataIn)]
    );

    let last = report.assertions.last().unwrap();
    assert_eq!(last.kind, AssertionKind::StageTimeout);
    assert_eq!(last.stage, Some(Stage::PreRun));
    assert!(report.execution.is_none());
}
