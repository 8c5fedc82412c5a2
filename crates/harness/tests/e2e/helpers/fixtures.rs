//! 시드 객체와 실행 설정

use std::time::Duration;

use flowtest_core::resources::{
    ComputeAccess, ContainerProfile, ContainerStorage, DEFAULT_NAMESPACE, LustreStorage, NodeRef,
    ObjectMeta, SYSTEM_NAMESPACE, StorageNode, StorageProfile, SystemConfiguration,
};
use flowtest_harness::RunConfig;
use flowtest_harness::allocator::SYSTEM_CONFIGURATION_NAME;

use super::fake_cluster::FakeCluster;

pub const RUN_ID: &str = "e2e-run";

/// Compute nodes in the seeded inventory.
pub const COMPUTE_NODES: [&str; 4] = ["compute-0", "compute-1", "compute-2", "compute-3"];

pub const EXTERNAL_COMPUTE: &str = "external-0";

/// Storage nodes, each reaching two computes.
pub const STORAGE_NODES: [&str; 2] = ["rabbit-0", "rabbit-1"];

/// Cluster seeded with the inventory and base profiles every case expects.
pub async fn seeded_cluster() -> FakeCluster {
    let cluster = FakeCluster::new();
    let store = cluster.store();

    let storage_nodes = STORAGE_NODES
        .iter()
        .enumerate()
        .map(|(i, name)| StorageNode {
            name: (*name).to_owned(),
            node_type: "Rabbit".to_owned(),
            computes_access: COMPUTE_NODES[i * 2..i * 2 + 2]
                .iter()
                .zip(0..)
                .map(|(compute, index)| ComputeAccess {
                    name: (*compute).to_owned(),
                    index,
                })
                .collect(),
        })
        .collect();

    let mut system = SystemConfiguration {
        metadata: ObjectMeta::new(DEFAULT_NAMESPACE, SYSTEM_CONFIGURATION_NAME),
        ..SystemConfiguration::default()
    };
    system.spec.compute_nodes = COMPUTE_NODES.iter().map(|n| node(n)).collect();
    system.spec.external_compute_nodes = vec![node(EXTERNAL_COMPUTE)];
    system.spec.storage_nodes = storage_nodes;
    store.insert(&system).await.unwrap();

    let mut profile = StorageProfile {
        metadata: ObjectMeta::new(SYSTEM_NAMESPACE, "default"),
        ..StorageProfile::default()
    };
    profile.data.default = true;
    profile.data.lustre_storage = LustreStorage {
        combined_mgt_mdt: true,
        ..LustreStorage::default()
    };
    store.insert(&profile).await.unwrap();

    for base in ["example-success", "example-forever", "example-mpi"] {
        let mut container = ContainerProfile {
            metadata: ObjectMeta::new(SYSTEM_NAMESPACE, base),
            ..ContainerProfile::default()
        };
        container.data.pre_run_timeout_seconds = Some(300);
        container.data.post_run_timeout_seconds = Some(300);
        container.data.retry_limit = 6;
        container.data.storages = vec![ContainerStorage {
            name: "DW_JOB_foo_local_storage".to_owned(),
            optional: false,
            extra: Default::default(),
        }];
        store.insert(&container).await.unwrap();
    }

    cluster
}

/// Run settings with a fixed run id and hardware available.
pub fn run_config() -> RunConfig {
    RunConfig {
        run_id: RUN_ID.to_owned(),
        poll_interval: Duration::from_secs(1),
        ..RunConfig::default()
    }
}

fn node(name: &str) -> NodeRef {
    NodeRef {
        name: name.to_owned(),
    }
}
