//! 스위트 실행 시나리오

use std::sync::Arc;

use flowtest_core::stage::Stage;
use flowtest_harness::system::{check_triage, mark_triage};
use flowtest_harness::{
    CaseResult, HarnessError, SuiteFilter, SuiteOptions, TestCase, run_suite, select,
};

use crate::helpers::fixtures::{run_config, seeded_cluster};

const TRIAGE: &str = "flowtest-triage";

fn simple(name: &str, fs: &str) -> TestCase {
    TestCase::new(
        name,
        [format!("#DW jobdw type={fs} name={fs} capacity=1TB")],
    )
    .with_labels(["simple"])
}

#[tokio::test(start_paused = true)]
async fn reports_follow_selection_order() {
    let cluster = Arc::new(seeded_cluster().await);
    let cases = select(
        vec![
            simple("XFS", "xfs"),
            simple("GFS2", "gfs2").serialized(),
            simple("Lustre", "lustre"),
            simple("Raw", "raw"),
        ],
        &SuiteFilter::default(),
    );
    let options = SuiteOptions {
        parallel: 3,
        triage_namespace: None,
    };

    let reports = run_suite(Arc::clone(&cluster), Arc::new(run_config()), cases, &options).await;

    let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["XFS", "GFS2", "Lustre", "Raw"]);
    assert!(reports.iter().all(|r| r.passed()));
    for workflow in ["xfs", "gfs2", "lustre", "raw"] {
        assert_eq!(cluster.stages_written(workflow), Stage::ALL);
    }
}

#[tokio::test(start_paused = true)]
async fn duplicated_case_runs_distinct_workflows() {
    let cluster = Arc::new(seeded_cluster().await);
    let cases = select(
        vec![simple("XFS", "xfs").duplicate(3).unwrap()],
        &SuiteFilter::default(),
    );
    assert_eq!(cases.len(), 3);

    let options = SuiteOptions {
        parallel: 3,
        triage_namespace: None,
    };
    let reports = run_suite(Arc::clone(&cluster), Arc::new(run_config()), cases, &options).await;

    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.passed()));
    for index in 0..3 {
        assert_eq!(cluster.stages_written(&format!("xfs-{index}")), Stage::ALL);
    }
}

#[tokio::test(start_paused = true)]
async fn failure_marks_system_for_triage() {
    let cluster = Arc::new(seeded_cluster().await);
    cluster.fail_in("gfs2", Stage::DataIn);
    let cases = vec![simple("XFS", "xfs"), simple("GFS2", "gfs2")];
    let options = SuiteOptions {
        parallel: 2,
        triage_namespace: Some(TRIAGE.to_owned()),
    };

    let reports = run_suite(Arc::clone(&cluster), Arc::new(run_config()), cases, &options).await;

    let results: Vec<CaseResult> = reports.iter().map(|r| r.result).collect();
    assert_eq!(results, [CaseResult::Passed, CaseResult::Failed]);

    let err = check_triage(cluster.as_ref(), TRIAGE).await.unwrap_err();
    assert!(matches!(err, HarnessError::TriageRequired { .. }));
    // 이미 표시된 시스템을 다시 표시해도 에러 아님
    mark_triage(cluster.as_ref(), TRIAGE).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn passing_suite_leaves_no_triage_marker() {
    let cluster = Arc::new(seeded_cluster().await);
    let options = SuiteOptions {
        parallel: 1,
        triage_namespace: Some(TRIAGE.to_owned()),
    };

    let reports = run_suite(
        Arc::clone(&cluster),
        Arc::new(run_config()),
        vec![simple("XFS", "xfs")],
        &options,
    )
    .await;

    assert!(reports[0].passed());
    check_triage(cluster.as_ref(), TRIAGE).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn label_filter_selects_subset() {
    let cluster = Arc::new(seeded_cluster().await);
    let cases = select(
        vec![
            simple("XFS", "xfs"),
            TestCase::new("Raw Unlabelled", ["#DW jobdw type=raw name=raw capacity=1TB"]),
        ],
        &SuiteFilter {
            labels: vec!["simple".to_owned()],
            name: None,
        },
    );

    let reports = run_suite(
        Arc::clone(&cluster),
        Arc::new(run_config()),
        cases,
        &SuiteOptions::default(),
    )
    .await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].name, "XFS");
    assert!(cluster.stages_written("raw-unlabelled").is_empty());
}
