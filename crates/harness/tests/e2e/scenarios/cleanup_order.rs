//! 정리 순서 시나리오
//!
//! 준비의 정확한 역순 정리, 실패한 정리 단계 이후의 계속 진행, 케이스가 만든
//! 영구 인스턴스의 정리를 검증합니다.

use flowtest_core::resources::{
    ContainerProfile, DEFAULT_NAMESPACE, SYSTEM_NAMESPACE, Storage, StorageProfile, Workflow,
};
use flowtest_core::stage::Stage;
use flowtest_harness::{CaseResult, ContainerProfileOverrides, TestCase, run_case};

use crate::helpers::fake_cluster::{FakeCluster, Verb};
use crate::helpers::fixtures::{run_config, seeded_cluster};

fn everything() -> TestCase {
    TestCase::new(
        "Everything",
        [
            "#DW jobdw type=lustre profile=everything-profile name=everything capacity=1TB",
            "#DW container name=everything profile=everything-container DW_JOB_foo_local_storage=everything",
        ],
    )
    .with_storage_profile()
    .unwrap()
    .with_container_profile("example-success", ContainerProfileOverrides::default())
    .unwrap()
    .with_persistent_lustre("everything-lustre")
    .unwrap()
    .with_global_lustre_from_persistent_lustre("everything", ["default"])
    .unwrap()
}

fn at(cluster: &FakeCluster, verb: Verb, kind: &str, name: &str) -> usize {
    cluster
        .position(verb, kind, name)
        .unwrap_or_else(|| panic!("no {verb:?} of {kind} '{name}' recorded"))
}

#[tokio::test(start_paused = true)]
async fn cleanup_reverses_preparation() {
    let cluster = seeded_cluster().await;
    let report = run_case(&cluster, &run_config(), everything()).await;
    assert!(report.passed(), "{:?} {:?}", report.error, report.cleanup_error);

    // 준비: 스토리지 프로파일 → 컨테이너 프로파일 → 영구 인스턴스 → 글로벌 마운트
    let prepared = [
        at(&cluster, Verb::Create, "NnfStorageProfile", "everything-profile"),
        at(&cluster, Verb::Create, "NnfContainerProfile", "everything-container"),
        at(&cluster, Verb::Create, "Workflow", "everything-lustre-create"),
        at(&cluster, Verb::Create, "LustreFileSystem", "global-everything"),
        at(&cluster, Verb::Create, "Workflow", "everything"),
    ];
    assert!(prepared.is_sorted(), "{prepared:?}");

    // 정리: 워크플로 → 글로벌 마운트 → 영구 인스턴스 → 컨테이너 프로파일 → 스토리지 프로파일
    let cleaned = [
        at(&cluster, Verb::Delete, "Workflow", "everything"),
        at(&cluster, Verb::Delete, "LustreFileSystem", "global-everything"),
        at(&cluster, Verb::Create, "Workflow", "everything-lustre-destroy"),
        at(&cluster, Verb::Delete, "NnfStorage", "everything-lustre"),
        at(&cluster, Verb::Delete, "Workflow", "everything-lustre-create"),
        at(&cluster, Verb::Delete, "Workflow", "everything-lustre-destroy"),
        at(&cluster, Verb::Delete, "NnfContainerProfile", "everything-container"),
        at(&cluster, Verb::Delete, "NnfStorageProfile", "everything-profile"),
    ];
    assert!(cleaned.is_sorted(), "{cleaned:?}");
}

#[tokio::test(start_paused = true)]
async fn failed_cleanup_step_does_not_stop_later_steps() {
    let cluster = seeded_cluster().await;
    cluster.fail_delete("NnfContainerProfile", "everything-container");

    let report = run_case(&cluster, &run_config(), everything()).await;

    assert_eq!(report.result, CaseResult::Failed);
    assert!(report.error.is_none(), "{:?}", report.error);
    let cleanup_error = report.cleanup_error.as_deref().unwrap();
    assert!(cleanup_error.contains("scripted delete failure"), "{cleanup_error}");

    assert!(
        cluster
            .contains::<ContainerProfile>(SYSTEM_NAMESPACE, "everything-container")
            .await
    );
    assert!(
        !cluster
            .contains::<StorageProfile>(SYSTEM_NAMESPACE, "everything-profile")
            .await
    );
    assert!(!cluster.contains::<Storage>(DEFAULT_NAMESPACE, "everything-lustre").await);
}

#[tokio::test(start_paused = true)]
async fn persistent_instance_created_by_case_is_destroyed() {
    let cluster = seeded_cluster().await;
    let case = TestCase::new(
        "Persistent Lustre",
        ["#DW create_persistent type=lustre name=persistent-lustre capacity=50GB"],
    )
    .and_cleanup_persistent_instance()
    .unwrap()
    .serialized();

    let report = run_case(&cluster, &run_config(), case).await;
    assert!(report.passed(), "{:?} {:?}", report.error, report.cleanup_error);

    let created = at(&cluster, Verb::Create, "NnfStorage", "persistent-lustre");
    let case_deleted = at(&cluster, Verb::Delete, "Workflow", "persistent-lustre");
    let destroyed = at(&cluster, Verb::Delete, "NnfStorage", "persistent-lustre");
    assert!(created < case_deleted && case_deleted < destroyed);

    assert_eq!(
        cluster.stages_written("persistent-lustre-destroy"),
        Stage::ALL
    );
    assert!(
        !cluster
            .contains::<Workflow>(DEFAULT_NAMESPACE, "persistent-lustre-destroy")
            .await
    );
}

#[tokio::test(start_paused = true)]
async fn global_mount_is_removed_before_mgs_pool_is_destroyed() {
    let cluster = seeded_cluster().await;
    let case = TestCase::new(
        "Pooled Global",
        ["#DW jobdw type=lustre profile=pooled-profile name=pooled capacity=1TB"],
    )
    .with_mgs_pool("pooled-mgs", 2)
    .with_storage_profile_external_mgs("pool:pooled-mgs")
    .unwrap()
    .with_persistent_lustre("pooled-lustre")
    .unwrap()
    .with_global_lustre_from_persistent_lustre("pooled", ["default"])
    .unwrap();

    let report = run_case(&cluster, &run_config(), case).await;
    assert!(report.passed(), "{:?} {:?}", report.error, report.cleanup_error);

    let pool_created = at(&cluster, Verb::Create, "Workflow", "mgs-pool-pooled-mgs-1-create");
    let mount_created = at(&cluster, Verb::Create, "LustreFileSystem", "global-pooled");
    assert!(pool_created < mount_created, "{pool_created} {mount_created}");

    let mount_deleted = at(&cluster, Verb::Delete, "LustreFileSystem", "global-pooled");
    let pool_destroyed = at(&cluster, Verb::Create, "Workflow", "mgs-pool-pooled-mgs-1-destroy");
    assert!(mount_deleted < pool_destroyed, "{mount_deleted} {pool_destroyed}");
    assert!(
        pool_destroyed < at(&cluster, Verb::Create, "Workflow", "mgs-pool-pooled-mgs-0-destroy")
    );
}
