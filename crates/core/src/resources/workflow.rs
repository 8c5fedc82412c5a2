//! Workflow-side objects: the workflow itself, its computes and directive
//! breakdowns, the servers it allocates on, and the system inventory.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::{ObjectMeta, ObjectReference, null_as_default};
use crate::stage::{Outcome, Stage};

/// Label prefix the controller uses for ownership tracking.
const DWS_LABEL_PREFIX: &str = "dataworkflowservices.github.io";

/// The workflow driven through the seven stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workflow {
    pub metadata: ObjectMeta,
    pub spec: WorkflowSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_resource!(
    Workflow,
    "Workflow",
    "dataworkflowservices.github.io/v1alpha2",
    "workflows.dataworkflowservices.github.io"
);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    pub desired_state: Stage,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dw_directives: Vec<String>,
    #[serde(rename = "wlmID", default)]
    pub wlm_id: String,
    /// Integer or string on the wire.
    #[serde(rename = "jobID", default)]
    pub job_id: Value,
    #[serde(rename = "userID", default)]
    pub user_id: u32,
    #[serde(rename = "groupID", default)]
    pub group_id: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for WorkflowSpec {
    fn default() -> Self {
        Self {
            desired_state: Stage::Proposal,
            dw_directives: Vec::new(),
            wlm_id: String::new(),
            job_id: Value::Null,
            user_id: 0,
            group_id: 0,
            extra: Map::new(),
        }
    }
}

/// Read surface of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    /// `None` until the controller has picked the workflow up.
    #[serde(default, deserialize_with = "empty_stage_as_none")]
    pub state: Option<Stage>,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub status: Outcome,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default)]
    pub computes: ObjectReference,
    #[serde(default, deserialize_with = "null_as_default")]
    pub directive_breakdowns: Vec<ObjectReference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkflowStatus {
    /// Ready and completed in `stage`.
    pub fn is_completed_in(&self, stage: Stage) -> bool {
        self.ready && self.status == Outcome::Completed && self.state == Some(stage)
    }

    /// Not ready and errored in `stage`.
    pub fn is_errored_in(&self, stage: Stage) -> bool {
        !self.ready && self.status == Outcome::Error && self.state == Some(stage)
    }
}

fn empty_stage_as_none<'de, D>(deserializer: D) -> Result<Option<Stage>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Labels stamped on objects a workflow owns: the workflow's own labels plus
/// owner and workflow identity.
pub fn owner_labels(workflow: &Workflow) -> BTreeMap<String, String> {
    let mut labels = workflow.metadata.labels.clone();
    let name = &workflow.metadata.name;
    let namespace = &workflow.metadata.namespace;

    labels.insert(format!("{DWS_LABEL_PREFIX}/owner.kind"), "Workflow".to_owned());
    labels.insert(format!("{DWS_LABEL_PREFIX}/owner.name"), name.clone());
    labels.insert(format!("{DWS_LABEL_PREFIX}/owner.namespace"), namespace.clone());
    labels.insert(format!("{DWS_LABEL_PREFIX}/workflow.name"), name.clone());
    labels.insert(format!("{DWS_LABEL_PREFIX}/workflow.namespace"), namespace.clone());
    labels
}

/// Compute nodes assigned to a workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Computes {
    pub metadata: ObjectMeta,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<ComputesData>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_resource!(
    Computes,
    "Computes",
    "dataworkflowservices.github.io/v1alpha2",
    "computes.dataworkflowservices.github.io"
);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputesData {
    pub name: String,
}

/// Storage requirement derived from one directive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectiveBreakdown {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: DirectiveBreakdownSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DirectiveBreakdownStatus>,
}

impl_resource!(
    DirectiveBreakdown,
    "DirectiveBreakdown",
    "dataworkflowservices.github.io/v1alpha2",
    "directivebreakdowns.dataworkflowservices.github.io"
);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectiveBreakdownSpec {
    #[serde(default)]
    pub directive: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectiveBreakdownStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageBreakdown>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageBreakdown {
    #[serde(default, deserialize_with = "null_as_default")]
    pub allocation_sets: Vec<StorageAllocationSet>,
    #[serde(default)]
    pub reference: ObjectReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAllocationSet {
    #[serde(default)]
    pub minimum_capacity: i64,
    #[serde(default)]
    pub label: String,
    pub allocation_strategy: AllocationStrategy,
}

/// How many storage-server allocations a set needs, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationStrategy {
    /// One allocation per storage node, sized to its compute-access count.
    AllocatePerCompute,
    /// One allocation per storage node.
    AllocateAcrossServers,
    /// A single allocation on one storage node.
    AllocateSingleServer,
    #[serde(other)]
    Unknown,
}

/// Storage servers assigned to a breakdown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Servers {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ServersSpec,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl_resource!(
    Servers,
    "Servers",
    "dataworkflowservices.github.io/v1alpha2",
    "servers.dataworkflowservices.github.io"
);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServersSpec {
    #[serde(default, deserialize_with = "null_as_default")]
    pub allocation_sets: Vec<ServersSpecAllocationSet>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServersSpecAllocationSet {
    pub allocation_size: i64,
    pub label: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub storage: Vec<ServersSpecStorage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServersSpecStorage {
    pub name: String,
    pub allocation_count: usize,
}

/// Inventory of compute and storage nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemConfiguration {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: SystemConfigurationSpec,
}

impl_resource!(
    SystemConfiguration,
    "SystemConfiguration",
    "dataworkflowservices.github.io/v1alpha2",
    "systemconfigurations.dataworkflowservices.github.io"
);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfigurationSpec {
    #[serde(default, deserialize_with = "null_as_default")]
    pub compute_nodes: Vec<NodeRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub external_compute_nodes: Vec<NodeRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub storage_nodes: Vec<StorageNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageNode {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub node_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub computes_access: Vec<ComputeAccess>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeAccess {
    pub name: String,
    #[serde(default)]
    pub index: u32,
}
