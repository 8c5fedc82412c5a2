//! 보조 리소스 준비 및 정리
//!
//! 케이스 옵션이 요구하는 보조 객체를 워크플로 생성 전에 만들고, 실행 후
//! 정확히 역순으로 제거합니다.
//!
//! # 준비 순서
//!
//! 1. 하드웨어 필요 여부 확인 (불가 시 `Skipped`)
//! 2. 스토리지 프로파일 (`nnf-system/default` 복제)
//! 3. 컨테이너 프로파일 (지정한 base 복제)
//! 4. 영구 Lustre 인스턴스 (중첩 create 케이스 실행 후 스토리지 준비 대기)
//! 5. MGS 풀 (인덱스마다 standalone MGT 영구 인스턴스 생성)
//! 6. 글로벌 Lustre 마운트 (+ copy-in 헬퍼)
//!
//! 정리는 헬퍼 파드 → 글로벌 마운트 → MGS 풀 → 영구 인스턴스 정리 → 영구
//! 인스턴스 → 컨테이너 프로파일 → 스토리지 프로파일 순서입니다. 모든 단계를
//! 시도하고 첫 번째 에러를 반환합니다.

use std::future::Future;
use std::pin::Pin;

use flowtest_core::metrics as m;
use flowtest_core::resources::{
    ContainerProfile, DEFAULT_NAMESPACE, LustreFileSystem, LustreFileSystemSpec, ObjectKey,
    ObjectMeta, Resource, SYSTEM_NAMESPACE, Storage, StorageProfile, Workflow,
};
use metrics::counter;
use tracing::{info, warn};

use crate::case::{ContainerProfileOption, StorageProfileOption, TestCase};
use crate::driver::StateDriver;
use crate::error::HarnessError;
use crate::helper::{cleanup_helper_pods, setup_copy_in};
use crate::run_config::{DELETION_TIMEOUT, RunConfig, STORAGE_READY_TIMEOUT};
use crate::store::{ResourceStore, delete_and_wait, get_opt};
use crate::wait::poll_until;

/// Name of the storage profile every case profile is cloned from.
pub const DEFAULT_STORAGE_PROFILE: &str = "default";

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of [`prepare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    Ready,
    /// The case cannot run here; nothing was created.
    Skipped { reason: String },
}

/// Creates every auxiliary object the case's options call for.
///
/// On error, objects created so far stay in place; [`cleanup`] removes them.
pub fn prepare<'a, S: ResourceStore>(
    store: &'a S,
    run: &'a RunConfig,
    case: &'a mut TestCase,
) -> BoxFuture<'a, Result<PrepareOutcome, HarnessError>> {
    Box::pin(async move {
        if case.options().hardware_required && !run.hardware_available {
            info!(test = case.name(), "hardware required, skipping");
            return Ok(PrepareOutcome::Skipped {
                reason: "test requires hardware and cannot run in a kind cluster".to_owned(),
            });
        }

        if let Some(profile) = case.options().storage_profile.clone() {
            create_storage_profile(store, &profile).await?;
        }

        if let Some(profile) = case.options().container_profile.clone() {
            create_container_profile(store, &profile).await?;
        }

        // CleanupPersistentInstance는 준비 단계에서 할 일이 없음

        if case.options().persistent.is_some() {
            create_persistent(store, run, case).await?;
        }

        if let Some(pool) = case.options().mgs_pool.clone() {
            for index in 0..pool.count {
                let mut nested = TestCase::new(
                    format!("MGS Pool {}-{index}-create", pool.name),
                    [format!(
                        "#DW create_persistent type=lustre name={}-{index} profile={}",
                        pool.name, pool.name
                    )],
                )
                .with_storage_profile_standalone_mgt(&pool.name)?;

                info!(pool = %pool.name, index, "creating persistent lustre MGS");
                prepare(store, run, &mut nested).await?;
                let driver = StateDriver::new(store, run);
                driver.create_workflow(&mut nested).await?;
                let executed = driver.execute(&mut nested).await;
                let cleaned = cleanup(store, run, &mut nested).await;
                let deleted = delete_and_wait::<S, Workflow>(
                    store,
                    &nested.workflow_key(),
                    DELETION_TIMEOUT,
                    run.poll_interval,
                )
                .await;
                executed?;
                cleaned?;
                deleted?;
            }
        }

        if case.options().global_mount.is_some() {
            create_global_mount(store, case).await?;
            setup_copy_in(store, run, case).await?;
        }

        Ok(PrepareOutcome::Ready)
    })
}

/// Removes everything [`prepare`] created, in reverse order.
///
/// Every step is attempted; the first failure is returned.
pub fn cleanup<'a, S: ResourceStore>(
    store: &'a S,
    run: &'a RunConfig,
    case: &'a mut TestCase,
) -> BoxFuture<'a, Result<(), HarnessError>> {
    Box::pin(async move {
        let test = case.name().to_owned();
        let mut first_error: Option<HarnessError> = None;
        let mut record = |kind: &'static str, result: Result<(), HarnessError>| {
            if let Err(e) = result {
                warn!(test = %test, kind, error = %e, "cleanup step failed");
                counter!(m::CLEANUP_FAILURES_TOTAL, m::LABEL_KIND => kind).increment(1);
                first_error.get_or_insert(e);
            }
        };

        record("Pod", cleanup_helper_pods(store, run, case).await);

        if let Some(mount) = case.options().global_mount.clone() {
            info!(name = %mount.name, "deleting global lustre");
            let key = ObjectKey::new(DEFAULT_NAMESPACE, &mount.name);
            record(
                LustreFileSystem::KIND,
                delete_and_wait::<S, LustreFileSystem>(store, &key, DELETION_TIMEOUT, run.poll_interval)
                    .await,
            );
        }

        if let Some(pool) = case.options().mgs_pool.clone() {
            for index in (0..pool.count).rev() {
                record("MgsPool", destroy_pool_member(store, run, &pool.name, index).await);
            }
        }

        if let Some(persistent) = case.options().cleanup_persistent.clone() {
            info!(name = %persistent.name, "destroying persistent instance");
            let mut destroy = *persistent.destroy;
            record("CleanupPersistent", run_and_delete(store, run, &mut destroy).await);
        }

        if case.options().persistent.is_some() {
            record("Persistent", destroy_persistent(store, run, case).await);
        }

        if let Some(profile) = case.options().container_profile.clone() {
            info!(name = %profile.name, "deleting container profile");
            let key = ObjectKey::new(SYSTEM_NAMESPACE, &profile.name);
            record(
                ContainerProfile::KIND,
                delete_and_wait::<S, ContainerProfile>(store, &key, DELETION_TIMEOUT, run.poll_interval)
                    .await,
            );
        }

        if let Some(profile) = case.options().storage_profile.clone() {
            info!(name = %profile.name, "deleting storage profile");
            let key = ObjectKey::new(SYSTEM_NAMESPACE, &profile.name);
            record(
                StorageProfile::KIND,
                delete_and_wait::<S, StorageProfile>(store, &key, DELETION_TIMEOUT, run.poll_interval)
                    .await,
            );
        }

        first_error.map_or(Ok(()), Err)
    })
}

/// Clones the default storage profile under the case's profile name.
async fn create_storage_profile<S: ResourceStore>(
    store: &S,
    option: &StorageProfileOption,
) -> Result<(), HarnessError> {
    info!(name = %option.name, "creating storage profile");
    let base: StorageProfile = store
        .get(&ObjectKey::new(SYSTEM_NAMESPACE, DEFAULT_STORAGE_PROFILE))
        .await?;
    store.create(&storage_profile_from(&base, option)).await?;
    Ok(())
}

/// Copy of `base` as a non-default profile with the option's MGS layout.
pub fn storage_profile_from(base: &StorageProfile, option: &StorageProfileOption) -> StorageProfile {
    let mut data = base.data.clone();
    data.default = false;

    let lustre = &mut data.lustre_storage;
    if let Some(mgs) = option.external_mgs.as_deref().filter(|s| !s.is_empty()) {
        lustre.combined_mgt_mdt = false;
        lustre.external_mgs = mgs.to_owned();
        lustre.standalone_mgt_pool_name.clear();
    } else if let Some(pool) = option.standalone_mgt.as_deref().filter(|s| !s.is_empty()) {
        lustre.combined_mgt_mdt = false;
        lustre.external_mgs.clear();
        lustre.standalone_mgt_pool_name = pool.to_owned();
    }

    StorageProfile {
        metadata: ObjectMeta::new(SYSTEM_NAMESPACE, &option.name),
        data,
        extra: Default::default(),
    }
}

/// Clones the base container profile under the case's profile name.
async fn create_container_profile<S: ResourceStore>(
    store: &S,
    option: &ContainerProfileOption,
) -> Result<(), HarnessError> {
    info!(name = %option.name, base = %option.base, "creating container profile");
    let base: ContainerProfile = store
        .get(&ObjectKey::new(SYSTEM_NAMESPACE, &option.base))
        .await?;
    store.create(&container_profile_from(&base, option)).await?;
    Ok(())
}

/// Copy of `base` with the option's overrides applied.
pub fn container_profile_from(
    base: &ContainerProfile,
    option: &ContainerProfileOption,
) -> ContainerProfile {
    let overrides = &option.overrides;
    let mut data = base.data.clone();

    if let Some(seconds) = overrides.pre_run_timeout_seconds {
        data.pre_run_timeout_seconds = Some(seconds);
    }
    if let Some(seconds) = overrides.post_run_timeout_seconds {
        data.post_run_timeout_seconds = Some(seconds);
    }
    if let Some(limit) = overrides.retry_limit {
        data.retry_limit = limit;
    }
    if overrides.no_storage {
        for storage in &mut data.storages {
            storage.optional = true;
        }
    }

    ContainerProfile {
        metadata: ObjectMeta::new(SYSTEM_NAMESPACE, &option.name),
        data,
        extra: Default::default(),
    }
}

/// Runs the nested create case and records the storage's fs name and MGS.
async fn create_persistent<S: ResourceStore>(
    store: &S,
    run: &RunConfig,
    case: &mut TestCase,
) -> Result<(), HarnessError> {
    let Some(persistent) = case.options_mut().persistent.as_mut() else {
        return Ok(());
    };
    info!(name = %persistent.name, capacity = %persistent.capacity, "creating persistent lustre instance");

    let driver = StateDriver::new(store, run);
    driver.create_workflow(&mut persistent.create).await?;
    driver.execute(&mut persistent.create).await?;

    let key = ObjectKey::new(DEFAULT_NAMESPACE, &persistent.name);
    let storage = poll_until(STORAGE_READY_TIMEOUT, run.poll_interval, || {
        let key = &key;
        async move {
            let storage: Storage = store.get(key).await?;
            Ok(storage.is_ready().then_some(storage))
        }
    })
    .await?
    .ok_or_else(|| HarnessError::WaitTimeout {
        what: format!("storage '{key}' to become ready"),
        timeout: STORAGE_READY_TIMEOUT,
    })?;

    let status = storage.status.unwrap_or_default();
    info!(
        name = %persistent.name,
        fs_name = %status.file_system_name,
        mgs = %status.mgs_address,
        "persistent lustre ready"
    );
    persistent.fs_name = Some(status.file_system_name);
    persistent.mgs_nids = Some(status.mgs_address);
    Ok(())
}

/// Destroys the persistent instance, then deletes both nested workflows.
///
/// The destroy case only runs if the create workflow was ever created.
async fn destroy_persistent<S: ResourceStore>(
    store: &S,
    run: &RunConfig,
    case: &mut TestCase,
) -> Result<(), HarnessError> {
    let Some(persistent) = case.options_mut().persistent.as_mut() else {
        return Ok(());
    };
    info!(name = %persistent.name, "deleting persistent lustre instance");

    let create_key = persistent.create.workflow_key();
    let destroy_key = persistent.destroy.workflow_key();
    let mut result = Ok(());

    if get_opt::<S, Workflow>(store, &create_key).await?.is_some() {
        let driver = StateDriver::new(store, run);
        result = async {
            driver.create_workflow(&mut persistent.destroy).await?;
            driver.execute(&mut persistent.destroy).await.map(|_| ())
        }
        .await;
    }

    for key in [create_key, destroy_key] {
        let deleted =
            delete_and_wait::<S, Workflow>(store, &key, DELETION_TIMEOUT, run.poll_interval).await;
        if result.is_ok() {
            result = deleted;
        }
    }
    result
}

/// Destroys pool member `index` if its storage exists.
async fn destroy_pool_member<S: ResourceStore>(
    store: &S,
    run: &RunConfig,
    pool: &str,
    index: usize,
) -> Result<(), HarnessError> {
    let instance = format!("{pool}-{index}");
    let storage_key = ObjectKey::new(DEFAULT_NAMESPACE, &instance);
    if get_opt::<S, Storage>(store, &storage_key).await?.is_none() {
        info!(instance = %instance, "MGS pool member not present, nothing to destroy");
        return Ok(());
    }

    info!(instance = %instance, "destroying persistent lustre MGS");
    let mut destroy = TestCase::new(
        format!("MGS Pool {instance}-destroy"),
        [format!("#DW destroy_persistent name={instance}")],
    );
    run_and_delete(store, run, &mut destroy).await
}

/// Creates and executes a nested case, then deletes its workflow.
///
/// The workflow is deleted even if execution fails.
async fn run_and_delete<S: ResourceStore>(
    store: &S,
    run: &RunConfig,
    nested: &mut TestCase,
) -> Result<(), HarnessError> {
    let driver = StateDriver::new(store, run);
    driver.create_workflow(nested).await?;
    let executed = driver.execute(nested).await.map(|_| ());
    let deleted = delete_and_wait::<S, Workflow>(
        store,
        &nested.workflow_key(),
        DELETION_TIMEOUT,
        run.poll_interval,
    )
    .await;
    executed.and(deleted)
}

/// Creates the global Lustre file system from the persistent instance.
async fn create_global_mount<S: ResourceStore>(
    store: &S,
    case: &TestCase,
) -> Result<(), HarnessError> {
    let options = case.options();
    let (Some(mount), Some(persistent)) = (&options.global_mount, &options.persistent) else {
        return Ok(());
    };
    let (Some(fs_name), Some(mgs_nids)) = (&persistent.fs_name, &persistent.mgs_nids) else {
        return Err(HarnessError::Invariant(format!(
            "persistent instance '{}' has no file system name",
            persistent.name
        )));
    };

    let lustre = LustreFileSystem {
        metadata: ObjectMeta::new(DEFAULT_NAMESPACE, &mount.name),
        spec: LustreFileSystemSpec {
            name: fs_name.clone(),
            mgs_nids: mgs_nids.clone(),
            mount_root: mount.mount_root.clone(),
            namespaces: mount.namespaces.clone(),
        },
    };
    info!(
        name = %lustre.key(),
        mount_root = %lustre.spec.mount_root,
        "creating global lustre file system"
    );
    store.create(&lustre).await?;
    Ok(())
}
