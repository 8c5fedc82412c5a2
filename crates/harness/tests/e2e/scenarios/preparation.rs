//! 준비 단계 시나리오
//!
//! 하드웨어 스킵, 프로파일 복제, 영구 Lustre + 글로벌 마운트 + 헬퍼 파드, MGS 풀을
//! 검증합니다.

use flowtest_core::resources::{
    ContainerProfile, DEFAULT_NAMESPACE, LustreFileSystem, ObjectKey, Pod, SYSTEM_NAMESPACE,
    Storage, StorageProfile, Workflow,
};
use flowtest_core::stage::Stage;
use flowtest_harness::{
    CaseResult, ContainerProfileOverrides, PrepareOutcome, ResourceStore, StateDriver, TestCase,
    cleanup, prepare, run_case,
};

use crate::helpers::fake_cluster::{FS_NAME, MGS_NIDS, Verb};
use crate::helpers::fixtures::{STORAGE_NODES, run_config, seeded_cluster};

const DM_WORKFLOW: &str = "gfs2-with-data-movement";

fn data_movement() -> TestCase {
    TestCase::new(
        "GFS2 with Data Movement",
        [
            "#DW jobdw type=gfs2 name=gfs2-dm capacity=1TB",
            "#DW copy_in source=/lus/global/testuser/test.in destination=$DW_JOB_gfs2-dm/",
            "#DW copy_out source=$DW_JOB_gfs2-dm/test.in destination=/lus/global/testuser/test.out",
        ],
    )
    .with_permissions(1050, 1051)
    .with_persistent_lustre("gfs2-dm-lustre")
    .unwrap()
    .with_global_lustre_from_persistent_lustre("global", ["default"])
    .unwrap()
    .hardware_required()
}

fn pod_key(script: &str) -> ObjectKey {
    ObjectKey::new(DEFAULT_NAMESPACE, format!("{DM_WORKFLOW}-{script}"))
}

#[tokio::test(start_paused = true)]
async fn hardware_case_is_skipped_without_touching_cluster() {
    let cluster = seeded_cluster().await;
    let run = run_config().with_hardware_available(false);

    let report = run_case(&cluster, &run, data_movement()).await;

    assert_eq!(report.result, CaseResult::Skipped);
    assert!(report.skip_reason.unwrap().contains("requires hardware"));
    assert!(report.execution.is_none());
    assert!(cluster.ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn storage_profile_is_cloned_then_removed() {
    let cluster = seeded_cluster().await;
    let run = run_config();
    let mut case = TestCase::new(
        "Lustre with Storage Profile",
        ["#DW jobdw type=lustre profile=my-lustre name=x capacity=1TB"],
    )
    .with_storage_profile_standalone_mgt("my-pool")
    .unwrap();

    let outcome = prepare(&cluster, &run, &mut case).await.unwrap();
    assert_eq!(outcome, PrepareOutcome::Ready);

    let key = ObjectKey::new(SYSTEM_NAMESPACE, "my-lustre");
    let profile: StorageProfile = cluster.get(&key).await.unwrap();
    assert!(!profile.data.default);
    assert!(!profile.data.lustre_storage.combined_mgt_mdt);
    assert_eq!(profile.data.lustre_storage.standalone_mgt_pool_name, "my-pool");

    cleanup(&cluster, &run, &mut case).await.unwrap();
    assert!(!cluster.contains::<StorageProfile>(SYSTEM_NAMESPACE, "my-lustre").await);
    // 기본 프로파일은 건드리지 않음
    assert!(cluster.contains::<StorageProfile>(SYSTEM_NAMESPACE, "default").await);
}

#[tokio::test(start_paused = true)]
async fn container_profile_overrides_are_applied() {
    let cluster = seeded_cluster().await;
    let run = run_config();
    let mut case = TestCase::new(
        "Container No Storage",
        [
            "#DW jobdw type=xfs name=local capacity=10GB",
            "#DW container name=no-storage profile=example-no-storage DW_JOB_foo_local_storage=local",
        ],
    )
    .with_container_profile(
        "example-success",
        ContainerProfileOverrides {
            post_run_timeout_seconds: Some(5),
            no_storage: true,
            ..ContainerProfileOverrides::default()
        },
    )
    .unwrap();

    prepare(&cluster, &run, &mut case).await.unwrap();

    let profile: ContainerProfile = cluster
        .get(&ObjectKey::new(SYSTEM_NAMESPACE, "example-no-storage"))
        .await
        .unwrap();
    assert_eq!(profile.data.pre_run_timeout_seconds, Some(300));
    assert_eq!(profile.data.post_run_timeout_seconds, Some(5));
    assert_eq!(profile.data.retry_limit, 6);
    assert!(profile.data.storages.iter().all(|s| s.optional));

    cleanup(&cluster, &run, &mut case).await.unwrap();
    assert!(
        !cluster
            .contains::<ContainerProfile>(SYSTEM_NAMESPACE, "example-no-storage")
            .await
    );
}

#[tokio::test(start_paused = true)]
async fn persistent_lustre_backs_global_mount_and_helpers() {
    let cluster = seeded_cluster().await;
    let run = run_config();
    let mut case = data_movement();

    assert_eq!(
        prepare(&cluster, &run, &mut case).await.unwrap(),
        PrepareOutcome::Ready
    );

    let persistent = case.options().persistent.as_ref().unwrap();
    assert_eq!(persistent.fs_name.as_deref(), Some(FS_NAME));
    assert_eq!(persistent.mgs_nids.as_deref(), Some(MGS_NIDS));
    assert!(cluster.contains::<Storage>(DEFAULT_NAMESPACE, "gfs2-dm-lustre").await);

    let lustre: LustreFileSystem = cluster
        .get(&ObjectKey::new(DEFAULT_NAMESPACE, "global-global"))
        .await
        .unwrap();
    assert_eq!(lustre.spec.name, FS_NAME);
    assert_eq!(lustre.spec.mgs_nids, MGS_NIDS);
    assert_eq!(lustre.spec.mount_root, "/lus/global");
    let namespaces: Vec<&str> = lustre.spec.namespaces.keys().map(String::as_str).collect();
    assert_eq!(namespaces, ["default", "nnf-dm-system"]);

    let copy_in: Pod = cluster.get(&pod_key("copy-in")).await.unwrap();
    assert_eq!(copy_in.spec.node_name, STORAGE_NODES[0]);
    assert_eq!(
        copy_in.spec.containers[0].args,
        ["/lus/global", "testuser/test.in", "1050", "1051"]
    );
    assert_eq!(case.helper_pods(), [pod_key("copy-in")]);

    // 워크플로 실행 중 DataOut에서 copy-out 검증
    let driver = StateDriver::new(&cluster, &run);
    driver.create_workflow(&mut case).await.unwrap();
    let execution = driver.execute(&mut case).await.unwrap();
    assert_eq!(execution.last_stage(), Some(Stage::Teardown));

    let copy_out: Pod = cluster.get(&pod_key("copy-out")).await.unwrap();
    assert_eq!(
        copy_out.spec.containers[0].args,
        ["/lus/global/testuser/test.in", "/lus/global/testuser/\\*/test.out", "4"]
    );
    assert_eq!(case.helper_pods().len(), 2);

    cleanup(&cluster, &run, &mut case).await.unwrap();
    assert!(case.helper_pods().is_empty());
    assert!(!cluster.contains::<Pod>(DEFAULT_NAMESPACE, "gfs2-with-data-movement-copy-in").await);
    assert!(!cluster.contains::<LustreFileSystem>(DEFAULT_NAMESPACE, "global-global").await);
    assert!(!cluster.contains::<Storage>(DEFAULT_NAMESPACE, "gfs2-dm-lustre").await);
    for workflow in ["gfs2-dm-lustre-create", "gfs2-dm-lustre-destroy"] {
        assert!(!cluster.contains::<Workflow>(DEFAULT_NAMESPACE, workflow).await);
    }
}

#[tokio::test(start_paused = true)]
async fn failed_copy_in_fails_case_but_cleans_up() {
    let cluster = seeded_cluster().await;
    cluster.fail_pod("gfs2-with-data-movement-copy-in");

    let report = run_case(&cluster, &run_config(), data_movement()).await;

    assert_eq!(report.result, CaseResult::Failed);
    let error = report.error.as_deref().unwrap();
    assert!(
        error.contains("helper pod 'default/gfs2-with-data-movement-copy-in' failed: scripted failure"),
        "{error}"
    );
    assert!(report.cleanup_error.is_none(), "{:?}", report.cleanup_error);

    // 워크플로는 만들어지지 않았고 보조 객체는 모두 정리됨
    assert!(cluster.position(Verb::Create, "Workflow", DM_WORKFLOW).is_none());
    assert!(cluster.position(Verb::Delete, "Pod", "gfs2-with-data-movement-copy-in").is_some());
    assert!(!cluster.contains::<LustreFileSystem>(DEFAULT_NAMESPACE, "global-global").await);
    assert!(!cluster.contains::<Storage>(DEFAULT_NAMESPACE, "gfs2-dm-lustre").await);
}

#[tokio::test(start_paused = true)]
async fn mgs_pool_members_are_created_then_destroyed_in_reverse() {
    let cluster = seeded_cluster().await;
    let case = TestCase::new(
        "Lustre with MGS Pool",
        ["#DW jobdw type=lustre profile=external-mgs name=pooled capacity=50GB"],
    )
    .with_mgs_pool("lustre-mgs-pool", 2)
    .with_storage_profile_external_mgs("pool:lustre-mgs-pool")
    .unwrap();

    let report = run_case(&cluster, &run_config(), case).await;
    assert!(report.passed(), "{:?} {:?}", report.error, report.cleanup_error);

    // 풀 멤버마다 standalone MGT 프로파일로 생성
    for index in 0..2 {
        let create = format!("mgs-pool-lustre-mgs-pool-{index}-create");
        let member = format!("lustre-mgs-pool-{index}");
        assert_eq!(cluster.stages_written(&create), Stage::ALL);
        assert!(
            cluster.position(Verb::Create, "NnfStorage", &member).unwrap()
                < cluster.position(Verb::Create, "Workflow", "lustre-with-mgs-pool").unwrap()
        );
        assert!(!cluster.contains::<Storage>(DEFAULT_NAMESPACE, &member).await);
        assert!(!cluster.contains::<Workflow>(DEFAULT_NAMESPACE, &create).await);
    }
    assert!(
        cluster
            .position(Verb::Create, "NnfStorageProfile", "lustre-mgs-pool")
            .is_some()
    );
    assert!(
        !cluster
            .contains::<StorageProfile>(SYSTEM_NAMESPACE, "lustre-mgs-pool")
            .await
    );

    // 역순으로 파괴
    let destroy_1 = cluster
        .position(Verb::Create, "Workflow", "mgs-pool-lustre-mgs-pool-1-destroy")
        .unwrap();
    let destroy_0 = cluster
        .position(Verb::Create, "Workflow", "mgs-pool-lustre-mgs-pool-0-destroy")
        .unwrap();
    assert!(destroy_1 < destroy_0);

    // 외부 MGS 프로파일은 풀 파괴 후 삭제
    let profile_deleted = cluster
        .position(Verb::Delete, "NnfStorageProfile", "external-mgs")
        .unwrap();
    assert!(destroy_0 < profile_deleted);
}
