//! Rabbit storage objects: storage and container profiles, the storage
//! backing a persistent instance, and global Lustre file systems.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ObjectMeta, null_as_default};

/// Storage profile. Cloned from `nnf-system/default` and tweaked per case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageProfile {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: StorageProfileData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_resource!(
    StorageProfile,
    "NnfStorageProfile",
    "nnf.cray.hpe.com/v1alpha6",
    "nnfstorageprofiles.nnf.cray.hpe.com"
);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfileData {
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub lustre_storage: LustreStorage,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Lustre layout knobs of a storage profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LustreStorage {
    #[serde(default)]
    pub combined_mgt_mdt: bool,
    #[serde(default)]
    pub external_mgs: String,
    #[serde(default)]
    pub standalone_mgt_pool_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Container profile. Cloned from a named base and tweaked per case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerProfile {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: ContainerProfileData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_resource!(
    ContainerProfile,
    "NnfContainerProfile",
    "nnf.cray.hpe.com/v1alpha6",
    "nnfcontainerprofiles.nnf.cray.hpe.com"
);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerProfileData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_run_timeout_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_run_timeout_seconds: Option<i64>,
    #[serde(default)]
    pub retry_limit: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub storages: Vec<ContainerStorage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStorage {
    pub name: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Storage created by the controller for a persistent instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Storage {
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StorageStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_resource!(
    Storage,
    "NnfStorage",
    "nnf.cray.hpe.com/v1alpha6",
    "nnfstorages.nnf.cray.hpe.com"
);

impl Storage {
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.ready)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub file_system_name: String,
    #[serde(default)]
    pub mgs_address: String,
}

/// A Lustre file system exposed to namespaces as a global mount.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LustreFileSystem {
    pub metadata: ObjectMeta,
    pub spec: LustreFileSystemSpec,
}

impl_resource!(
    LustreFileSystem,
    "LustreFileSystem",
    "lus.cray.hpe.com/v1alpha1",
    "lustrefilesystems.lus.cray.hpe.com"
);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LustreFileSystemSpec {
    /// Lustre fsname, not the object name.
    pub name: String,
    pub mgs_nids: String,
    pub mount_root: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub namespaces: BTreeMap<String, LustreNamespace>,
}

/// Access modes granted to one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LustreNamespace {
    #[serde(default)]
    pub modes: Vec<String>,
}
