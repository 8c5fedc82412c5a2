//! 시나리오 카탈로그
//!
//! `flowtest run`/`flowtest list`가 다루는 케이스 목록입니다. 순서가 곧 실행과
//! 보고 순서입니다.
//!
//! ```text
//! TestCase::new("Stop After", ["#DW ..."]).stop_after(Stage::PreRun)
//! TestCase::new("XFS", ["#DW ..."]).duplicate(20)?
//! TestCase::new("Focused", ["#DW ..."]).focused()
//! ```

use flowtest_core::stage::Stage;
use flowtest_harness::case::label::SIMPLE;
use flowtest_harness::{ContainerProfileOverrides, HarnessError, TestCase};

/// 컨테이너 케이스가 쓰는 사용자/그룹
const CONTAINER_UID: u32 = 1050;
const CONTAINER_GID: u32 = 1051;

/// 카탈로그 전체를 생성합니다.
///
/// 잘못 선언된 케이스가 하나라도 있으면 실행 전에 실패합니다.
pub fn cases() -> Result<Vec<TestCase>, HarnessError> {
    let mut cases = simple();
    cases.extend(storage_profiles()?);
    cases.extend(persistent()?);
    cases.extend(data_movement()?);
    cases.extend(mpi_containers()?);
    cases.extend(containers()?);
    cases.extend(unsupported_filesystems());
    cases.extend(multi_storage()?);
    cases.extend(external_mgs()?);
    Ok(cases)
}

fn simple() -> Vec<TestCase> {
    [("XFS", "xfs"), ("GFS2", "gfs2"), ("Lustre", "lustre"), ("Raw", "raw")]
        .into_iter()
        .map(|(name, fs)| {
            TestCase::new(name, [format!("#DW jobdw type={fs} name={fs} capacity=1TB")])
                .with_labels([SIMPLE])
        })
        .collect()
}

fn storage_profiles() -> Result<Vec<TestCase>, HarnessError> {
    Ok(vec![
        TestCase::new(
            "XFS with Storage Profile",
            ["#DW jobdw type=xfs name=xfs-storage-profile capacity=1TB profile=my-xfs-storage-profile"],
        )
        .with_storage_profile()?,
        TestCase::new(
            "GFS2 with Storage Profile",
            ["#DW jobdw type=gfs2 name=gfs2-storage-profile capacity=1TB profile=my-gfs2-storage-profile"],
        )
        .with_storage_profile()?,
    ])
}

fn persistent() -> Result<Vec<TestCase>, HarnessError> {
    Ok(vec![
        TestCase::new(
            "Persistent Lustre",
            ["#DW create_persistent type=lustre name=persistent-lustre capacity=1TB"],
        )
        .and_cleanup_persistent_instance()?
        .serialized(),
    ])
}

fn data_movement() -> Result<Vec<TestCase>, HarnessError> {
    Ok(vec![
        TestCase::new(
            "XFS with Data Movement",
            [
                "#DW jobdw type=xfs name=xfs-data-movement capacity=1TB",
                "#DW copy_in source=/lus/global/testuser/test.in destination=$DW_JOB_xfs-data-movement/",
                "#DW copy_out source=$DW_JOB_xfs-data-movement/test.in destination=/lus/global/testuser/test.out",
            ],
        )
        .with_persistent_lustre("xfs-data-movement-lustre-instance")?
        .with_global_lustre_from_persistent_lustre("global", ["default"])?
        .hardware_required(),
    ])
}

fn mpi_containers() -> Result<Vec<TestCase>, HarnessError> {
    Ok(vec![
        TestCase::new(
            "GFS2 with MPI Containers",
            [
                "#DW jobdw type=gfs2 name=gfs2-with-containers-mpi capacity=100GB",
                "#DW container name=gfs2-with-containers-mpi profile=example-mpi \
                 DW_JOB_foo_local_storage=gfs2-with-containers-mpi",
            ],
        )
        .with_permissions(CONTAINER_UID, CONTAINER_GID)
        .with_labels(["mpi"]),
        TestCase::new(
            "Lustre with MPI Containers",
            [
                "#DW jobdw type=lustre name=lustre-with-containers-mpi capacity=100GB",
                "#DW container name=lustre-with-containers-mpi profile=example-mpi \
                 DW_JOB_foo_local_storage=lustre-with-containers-mpi",
            ],
        )
        .with_permissions(CONTAINER_UID, CONTAINER_GID)
        .with_labels(["mpi"]),
        TestCase::new(
            "GFS2 and Global Lustre with MPI Containers",
            [
                "#DW jobdw type=gfs2 name=gfs2-and-global-with-containers-mpi capacity=100GB",
                "#DW container name=gfs2-and-global-with-containers-mpi profile=example-mpi \
                 DW_JOB_foo_local_storage=gfs2-and-global-with-containers-mpi \
                 DW_GLOBAL_foo_global_lustre=/lus/sawbill",
            ],
        )
        .with_permissions(CONTAINER_UID, CONTAINER_GID)
        .with_persistent_lustre("gfs2-and-global-with-containers-mpi-sawbill")?
        .with_global_lustre_from_persistent_lustre("sawbill", ["default"])?
        .with_labels(["mpi", "global-lustre"]),
        // 실패 시나리오
        TestCase::new(
            "PreRun timeout on MPI containers",
            ["#DW container name=prerun-timeout-mpi profile=example-mpi-prerun-timeout"],
        )
        .with_permissions(CONTAINER_UID, CONTAINER_GID)
        .with_labels(["mpi", "timeout"])
        .with_container_profile(
            "example-mpi",
            ContainerProfileOverrides {
                pre_run_timeout_seconds: Some(1),
                no_storage: true,
                ..ContainerProfileOverrides::default()
            },
        )?
        .expect_error(Stage::PreRun),
        TestCase::new(
            "PostRun timeout on MPI containers",
            ["#DW container name=postrun-timeout-mpi profile=example-mpi-postrun-timeout"],
        )
        .with_permissions(CONTAINER_UID, CONTAINER_GID)
        .with_labels(["mpi", "timeout"])
        .with_container_profile(
            "example-mpi-webserver",
            ContainerProfileOverrides {
                post_run_timeout_seconds: Some(1),
                no_storage: true,
                ..ContainerProfileOverrides::default()
            },
        )?
        .expect_error(Stage::PostRun),
        TestCase::new(
            "Non-zero exit on MPI containers",
            ["#DW container name=mpi-container-fail profile=example-mpi-fail-noretry"],
        )
        .with_permissions(CONTAINER_UID, CONTAINER_GID)
        .with_labels(["mpi", "fail"])
        .with_container_profile(
            "example-mpi-fail",
            ContainerProfileOverrides {
                retry_limit: Some(0),
                ..ContainerProfileOverrides::default()
            },
        )?
        .expect_error(Stage::PostRun),
    ])
}

fn containers() -> Result<Vec<TestCase>, HarnessError> {
    Ok(vec![
        TestCase::new(
            "GFS2 with Containers",
            [
                "#DW jobdw type=gfs2 name=gfs2-with-containers capacity=100GB",
                "#DW container name=gfs2-with-containers profile=example-success \
                 DW_JOB_foo_local_storage=gfs2-with-containers",
            ],
        )
        .with_permissions(CONTAINER_UID, CONTAINER_GID)
        .with_labels(["non-mpi"]),
        TestCase::new(
            "GFS2 and Global Lustre with Containers",
            [
                "#DW jobdw type=gfs2 name=gfs2-and-global-with-containers capacity=100GB",
                "#DW container name=gfs2-and-global-with-containers profile=example-success \
                 DW_JOB_foo_local_storage=gfs2-and-global-with-containers \
                 DW_GLOBAL_foo_global_lustre=/lus/cherokee",
            ],
        )
        .with_permissions(CONTAINER_UID, CONTAINER_GID)
        .with_persistent_lustre("gfs2-and-global-with-containers-cherokee")?
        .with_global_lustre_from_persistent_lustre("cherokee", ["default"])?
        .with_labels(["non-mpi", "global-lustre"]),
        // 실패 시나리오
        TestCase::new(
            "PreRun timeout on non-MPI containers",
            ["#DW container name=prerun-timeout profile=example-prerun-timeout"],
        )
        .with_permissions(CONTAINER_UID, CONTAINER_GID)
        .with_labels(["non-mpi", "timeout"])
        .with_container_profile(
            "example-forever",
            ContainerProfileOverrides {
                pre_run_timeout_seconds: Some(1),
                no_storage: true,
                ..ContainerProfileOverrides::default()
            },
        )?
        .expect_error(Stage::PreRun),
        TestCase::new(
            "PostRun timeout on non-MPI containers",
            ["#DW container name=postrun-timeout profile=example-postrun-timeout"],
        )
        .with_permissions(CONTAINER_UID, CONTAINER_GID)
        .with_labels(["non-mpi", "timeout"])
        .with_container_profile(
            "example-forever",
            ContainerProfileOverrides {
                post_run_timeout_seconds: Some(1),
                no_storage: true,
                ..ContainerProfileOverrides::default()
            },
        )?
        .expect_error(Stage::PostRun),
        TestCase::new(
            "Non-zero exit on non-MPI containers",
            ["#DW container name=container-fail profile=example-fail-noretry"],
        )
        .with_permissions(CONTAINER_UID, CONTAINER_GID)
        .with_labels(["non-mpi", "fail"])
        .with_container_profile(
            "example-fail",
            ContainerProfileOverrides {
                retry_limit: Some(0),
                ..ContainerProfileOverrides::default()
            },
        )?
        .expect_error(Stage::PostRun),
    ])
}

/// xfs/raw는 컨테이너 스토리지로 지원되지 않아 Proposal에서 에러가 나야 합니다.
fn unsupported_filesystems() -> Vec<TestCase> {
    [("XFS", "xfs"), ("Raw", "raw")]
        .into_iter()
        .map(|(label, fs)| {
            let name = format!("{fs}-with-containers");
            TestCase::new(
                format!("{label} with Containers"),
                [
                    format!("#DW jobdw type={fs} name={name} capacity=100GB"),
                    format!(
                        "#DW container name={name} profile=example-success DW_JOB_foo_local_storage={name}"
                    ),
                ],
            )
            .expect_error(Stage::Proposal)
            .with_labels(["unsupported-fs"])
        })
        .collect()
}

fn multi_storage() -> Result<Vec<TestCase>, HarnessError> {
    Ok(vec![
        TestCase::new(
            "GFS2 and Lustre with Containers",
            [
                "#DW jobdw name=containers-local-storage type=gfs2 capacity=100GB",
                "#DW persistentdw name=containers-persistent-storage",
                "#DW container name=gfs2-lustre-with-containers profile=example-success \
                 DW_JOB_foo_local_storage=containers-local-storage \
                 DW_PERSISTENT_foo_persistent_storage=containers-persistent-storage",
            ],
        )
        .with_persistent_lustre("containers-persistent-storage")?
        .with_permissions(CONTAINER_UID, CONTAINER_GID)
        .with_labels(["multi-storage"]),
        TestCase::new(
            "GFS2 and Lustre with Containers MPI",
            [
                "#DW jobdw name=containers-local-storage-mpi type=gfs2 capacity=100GB",
                "#DW persistentdw name=containers-persistent-storage-mpi",
                "#DW container name=gfs2-lustre-with-containers-mpi profile=example-mpi \
                 DW_JOB_foo_local_storage=containers-local-storage-mpi \
                 DW_PERSISTENT_foo_persistent_storage=containers-persistent-storage-mpi",
            ],
        )
        .with_persistent_lustre("containers-persistent-storage-mpi")?
        .with_permissions(CONTAINER_UID, CONTAINER_GID)
        .with_labels(["multi-storage"]),
    ])
}

fn external_mgs() -> Result<Vec<TestCase>, HarnessError> {
    Ok(vec![
        TestCase::new(
            "Lustre with MGS pool",
            ["#DW jobdw name=external-mgs-pool type=lustre capacity=100GB profile=example-external-mgs"],
        )
        .with_mgs_pool("lustre-mgs-pool", 1)
        .with_storage_profile_external_mgs("pool:lustre-mgs-pool")?,
    ])
}
