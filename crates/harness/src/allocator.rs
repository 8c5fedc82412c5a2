//! Setup 스테이지 자원 할당
//!
//! 실제 WLM 대신 컴퓨트 노드와 스토리지 서버를 워크플로에 배정합니다.
//!
//! 1. `Computes`: 시스템 구성의 컴퓨트 노드 전체 (옵션에 따라 외부 컴퓨트 포함)
//! 2. `Servers`: 디렉티브 브레이크다운의 할당 세트마다 전략에 맞는 스토리지 목록
//!
//! 배정 대상 객체는 비어 있어야 합니다. 이미 채워져 있으면 다른 주체가 개입한
//! 것이므로 [`HarnessError::Invariant`]로 케이스를 실패시킵니다.

use flowtest_core::directive::{command, parse_args};
use flowtest_core::resources::{
    AllocationStrategy, Computes, ComputesData, DEFAULT_NAMESPACE, DirectiveBreakdown, ObjectKey,
    Servers, ServersSpecAllocationSet, ServersSpecStorage, StorageAllocationSet, StorageNode,
    SystemConfiguration, Workflow,
};
use rand::Rng;
use tracing::{debug, info};

use crate::case::TestCase;
use crate::error::HarnessError;
use crate::run_config::{BREAKDOWN_READY_TIMEOUT, RunConfig};
use crate::store::ResourceStore;
use crate::wait::poll_until;

/// Name of the singleton system configuration.
pub const SYSTEM_CONFIGURATION_NAME: &str = "default";

/// Storage entries for one allocation set under `strategy`.
///
/// - `AllocatePerCompute`: every storage node, count = its compute-access count
/// - `AllocateAcrossServers`: every storage node, count 1
/// - `AllocateSingleServer`: one uniformly random node, count 1
/// - unknown strategies: nothing
pub fn storage_for_strategy<R: Rng + ?Sized>(
    strategy: AllocationStrategy,
    nodes: &[StorageNode],
    rng: &mut R,
) -> Vec<ServersSpecStorage> {
    match strategy {
        AllocationStrategy::AllocatePerCompute => nodes
            .iter()
            .map(|node| ServersSpecStorage {
                name: node.name.clone(),
                allocation_count: node.computes_access.len(),
            })
            .collect(),
        AllocationStrategy::AllocateAcrossServers => nodes
            .iter()
            .map(|node| ServersSpecStorage {
                name: node.name.clone(),
                allocation_count: 1,
            })
            .collect(),
        AllocationStrategy::AllocateSingleServer if !nodes.is_empty() => {
            let node = &nodes[rng.random_range(0..nodes.len())];
            vec![ServersSpecStorage {
                name: node.name.clone(),
                allocation_count: 1,
            }]
        }
        _ => Vec::new(),
    }
}

fn allocation_sets(
    sets: &[StorageAllocationSet],
    nodes: &[StorageNode],
) -> Vec<ServersSpecAllocationSet> {
    let mut rng = rand::rng();
    sets.iter()
        .map(|set| ServersSpecAllocationSet {
            allocation_size: set.minimum_capacity,
            label: set.label.clone(),
            storage: storage_for_strategy(set.allocation_strategy, nodes, &mut rng),
        })
        .collect()
}

/// Reads the system inventory, requiring at least one compute and one storage node.
pub async fn system_configuration<S: ResourceStore>(
    store: &S,
) -> Result<SystemConfiguration, HarnessError> {
    let system: SystemConfiguration = store
        .get(&ObjectKey::new(DEFAULT_NAMESPACE, SYSTEM_CONFIGURATION_NAME))
        .await?;
    if system.spec.compute_nodes.is_empty() {
        return Err(HarnessError::Invariant(
            "system configuration has no compute nodes".to_owned(),
        ));
    }
    if system.spec.storage_nodes.is_empty() {
        return Err(HarnessError::Invariant(
            "system configuration has no storage nodes".to_owned(),
        ));
    }
    Ok(system)
}

/// Assigns computes and storage servers to the case's workflow.
///
/// The compute snapshot is kept on the case for the copy-out helper.
pub async fn assign_resources<S: ResourceStore>(
    store: &S,
    run: &RunConfig,
    case: &mut TestCase,
) -> Result<(), HarnessError> {
    let workflow: Workflow = store.get(&case.workflow_key()).await?;
    let status = workflow.status.ok_or_else(|| {
        HarnessError::Invariant(format!("workflow '{}' has no status", case.workflow_key()))
    })?;
    let system = system_configuration(store).await?;

    // 컴퓨트 배정
    let computes_key = ObjectKey::from(&status.computes);
    let mut computes: Computes = store.get(&computes_key).await?;
    if !computes.data.is_empty() {
        return Err(HarnessError::Invariant(format!(
            "computes '{computes_key}' already has {} entries",
            computes.data.len()
        )));
    }

    let mut nodes = system.spec.compute_nodes.clone();
    if case.options().external_computes {
        nodes.extend(system.spec.external_compute_nodes.iter().cloned());
    }
    computes.data = nodes
        .into_iter()
        .map(|node| ComputesData { name: node.name })
        .collect();
    let computes = store.update(&computes).await?;
    info!(
        workflow = %case.workflow_key(),
        computes = computes.data.len(),
        "assigned computes"
    );
    case.computes = Some(computes);

    // 스토리지 서버 배정
    for reference in &status.directive_breakdowns {
        let key = ObjectKey::from(reference);
        let breakdown = poll_until(BREAKDOWN_READY_TIMEOUT, run.poll_interval, || {
            let key = &key;
            async move {
                let breakdown: DirectiveBreakdown = store.get(key).await?;
                let ready = breakdown.status.as_ref().is_some_and(|s| s.ready);
                Ok(ready.then_some(breakdown))
            }
        })
        .await?
        .ok_or_else(|| HarnessError::WaitTimeout {
            what: format!("directive breakdown '{key}' to become ready"),
            timeout: BREAKDOWN_READY_TIMEOUT,
        })?;

        let args = parse_args(&breakdown.spec.directive)?;
        let storage = breakdown.status.and_then(|s| s.storage);

        if args.is(command::PERSISTENT_DW) {
            if storage.is_some() {
                return Err(HarnessError::Invariant(format!(
                    "persistentdw breakdown '{key}' unexpectedly carries storage"
                )));
            }
            debug!(breakdown = %key, "persistentdw needs no servers");
            continue;
        }

        let storage = storage
            .filter(|s| !s.allocation_sets.is_empty())
            .ok_or_else(|| {
                HarnessError::Invariant(format!("breakdown '{key}' has no allocation sets"))
            })?;

        let servers_key = ObjectKey::from(&storage.reference);
        let mut servers: Servers = store.get(&servers_key).await?;
        if !servers.spec.allocation_sets.is_empty() {
            return Err(HarnessError::Invariant(format!(
                "servers '{servers_key}' already has allocation sets"
            )));
        }

        servers.spec.allocation_sets =
            allocation_sets(&storage.allocation_sets, &system.spec.storage_nodes);
        store.update(&servers).await?;
        info!(
            breakdown = %key,
            servers = %servers_key,
            sets = storage.allocation_sets.len(),
            "assigned storage servers"
        );
    }

    Ok(())
}
