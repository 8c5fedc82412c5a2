//! Typed views of the remote objects the harness reads and writes.
//!
//! Only the fields the harness acts on are modelled. Types that are read,
//! modified and written back keep everything else in a flattened `extra`
//! map, so a full replace never drops fields owned by the controller.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

macro_rules! impl_resource {
    ($ty:ty, $kind:literal, $api_version:literal, $resource:literal) => {
        impl $crate::resources::Resource for $ty {
            const KIND: &'static str = $kind;
            const API_VERSION: &'static str = $api_version;
            const RESOURCE: &'static str = $resource;

            fn metadata(&self) -> &$crate::resources::ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut $crate::resources::ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

mod core_v1;
mod nnf;
mod workflow;

pub use core_v1::{
    ConfigMap, Container, Namespace, PersistentVolumeClaimSource, Pod, PodPhase, PodSpec,
    PodStatus, Volume, VolumeMount,
};
pub use nnf::{
    ContainerProfile, ContainerProfileData, ContainerStorage, LustreFileSystem,
    LustreFileSystemSpec, LustreNamespace, LustreStorage, Storage, StorageProfile,
    StorageProfileData, StorageStatus,
};
pub use workflow::{
    AllocationStrategy, ComputeAccess, Computes, ComputesData, DirectiveBreakdown,
    DirectiveBreakdownSpec, DirectiveBreakdownStatus, NodeRef, Servers, ServersSpec,
    ServersSpecAllocationSet, ServersSpecStorage, StorageAllocationSet, StorageBreakdown,
    StorageNode, SystemConfiguration, SystemConfigurationSpec, Workflow, WorkflowSpec,
    WorkflowStatus, owner_labels,
};

/// Namespace workflows and most workflow-owned objects live in.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Namespace holding storage and container profiles.
pub const SYSTEM_NAMESPACE: &str = "nnf-system";

/// Namespace data-movement workers run in; always granted global mount access.
pub const DATA_MOVEMENT_NAMESPACE: &str = "nnf-dm-system";

/// An object kind the store can address.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Object kind, e.g. `Workflow`.
    const KIND: &'static str;
    /// `group/version` (or just `v1` for the core group).
    const API_VERSION: &'static str;
    /// Fully-qualified resource name understood by `kubectl`.
    const RESOURCE: &'static str;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> ObjectKey {
        let meta = self.metadata();
        ObjectKey::new(&meta.namespace, &meta.name)
    }
}

/// Namespace + name identifying one object of a kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Empty for cluster-scoped kinds.
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a cluster-scoped object.
    pub fn cluster(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

impl From<&ObjectReference> for ObjectKey {
    fn from(r: &ObjectReference) -> Self {
        ObjectKey::new(&r.namespace, &r.name)
    }
}

/// Standard object metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }
}

/// Reference from one object to another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

/// Deserializes `null` the same as an absent field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
