//! 스크립트 가능한 가짜 클러스터
//!
//! [`MemoryStore`] 위에 워크플로 컨트롤러의 최소 반응을 얹은 [`ResourceStore`]입니다.
//!
//! - 워크플로 생성: 빈 `Computes`, 디렉티브별 `DirectiveBreakdown`/`Servers`를
//!   만들고 Proposal을 `Completed`로 보고
//! - desired state 기록: 해당 스테이지를 즉시 `Completed`로 보고 (스크립트된
//!   에러/정체 제외)
//! - `create_persistent` 워크플로의 Setup: 준비된 `NnfStorage` 생성
//! - `destroy_persistent` 워크플로의 Teardown: `NnfStorage` 삭제
//! - 파드 생성: `Succeeded` (스크립트 시 `Failed`)
//!
//! 모든 create/update/delete는 순서대로 기록되어 정리 순서를 검증할 수 있습니다.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use flowtest_core::directive::{command, parse_args};
use flowtest_core::error::StoreError;
use flowtest_core::resources::{
    AllocationStrategy, Computes, DirectiveBreakdown, DirectiveBreakdownSpec,
    DirectiveBreakdownStatus, ObjectKey, ObjectMeta, ObjectReference, Pod, PodPhase, PodStatus,
    Resource, Servers, Storage, StorageAllocationSet, StorageBreakdown, StorageStatus, Workflow,
    WorkflowStatus,
};
use flowtest_core::stage::{Outcome, Stage};
use flowtest_harness::{MemoryStore, ResourceStore};

/// Lustre fsname reported for every persistent instance.
pub const FS_NAME: &str = "fakefs";

/// MGS address reported for every persistent instance.
pub const MGS_NIDS: &str = "10.1.1.1@tcp";

/// Context the fake reports; not a kind cluster.
pub const CONTEXT: &str = "rabbit-e2e";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Create,
    Update,
    Delete,
}

/// One recorded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
    pub verb: Verb,
    pub kind: String,
    pub key: ObjectKey,
    /// Desired state carried by workflow writes.
    pub stage: Option<Stage>,
}

#[derive(Default)]
struct Script {
    errors: HashMap<String, Stage>,
    stalls: HashMap<String, Stage>,
    failing_pods: HashSet<String>,
    failing_deletes: HashSet<(String, String)>,
    conflicts: usize,
}

pub struct FakeCluster {
    store: MemoryStore,
    script: Mutex<Script>,
    ops: Mutex<Vec<Op>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::with_context(CONTEXT),
            script: Mutex::new(Script::default()),
            ops: Mutex::new(Vec::new()),
        }
    }

    /// Backing store, for seeding fixtures and unrecorded reads.
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    // --- 스크립트 ---

    /// `workflow` reports `Error` once it reaches `stage`.
    pub fn fail_in(&self, workflow: &str, stage: Stage) {
        self.script
            .lock()
            .unwrap()
            .errors
            .insert(workflow.to_owned(), stage);
    }

    /// `workflow` stays `Running` once it reaches `stage`.
    pub fn stall_in(&self, workflow: &str, stage: Stage) {
        self.script
            .lock()
            .unwrap()
            .stalls
            .insert(workflow.to_owned(), stage);
    }

    /// The pod named `pod` ends in `Failed`.
    pub fn fail_pod(&self, pod: &str) {
        self.script
            .lock()
            .unwrap()
            .failing_pods
            .insert(pod.to_owned());
    }

    /// Deleting `kind` `name` fails with an API error.
    pub fn fail_delete(&self, kind: &str, name: &str) {
        self.script
            .lock()
            .unwrap()
            .failing_deletes
            .insert((kind.to_owned(), name.to_owned()));
    }

    /// The next `count` workflow updates conflict.
    pub fn conflict_next_updates(&self, count: usize) {
        self.script.lock().unwrap().conflicts = count;
    }

    // --- 기록 조회 ---

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    /// Index of the first `verb` on `kind` named `name`.
    pub fn position(&self, verb: Verb, kind: &str, name: &str) -> Option<usize> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .position(|op| op.verb == verb && op.kind == kind && op.key.name == name)
    }

    /// Desired states written to `workflow`, in order, starting with creation.
    pub fn stages_written(&self, workflow: &str) -> Vec<Stage> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.kind == Workflow::KIND && op.key.name == workflow)
            .filter_map(|op| op.stage)
            .collect()
    }

    pub async fn contains<R: Resource>(&self, namespace: &str, name: &str) -> bool {
        self.store
            .contains(R::KIND, &ObjectKey::new(namespace, name))
            .await
    }

    // --- 내부 ---

    fn record(&self, verb: Verb, kind: &str, key: ObjectKey, stage: Option<Stage>) {
        self.ops.lock().unwrap().push(Op {
            verb,
            kind: kind.to_owned(),
            key,
            stage,
        });
    }

    fn take_conflict(&self) -> bool {
        let mut script = self.script.lock().unwrap();
        if script.conflicts == 0 {
            return false;
        }
        script.conflicts -= 1;
        true
    }

    fn outcome_for(&self, workflow: &str, stage: Stage) -> (bool, Outcome, String) {
        let script = self.script.lock().unwrap();
        if script.errors.get(workflow) == Some(&stage) {
            (false, Outcome::Error, format!("scripted error in {stage}"))
        } else if script.stalls.get(workflow) == Some(&stage) {
            (false, Outcome::Running, format!("stalled in {stage}"))
        } else {
            (true, Outcome::Completed, String::new())
        }
    }

    fn pod_status(&self, pod: &str) -> PodStatus {
        if self.script.lock().unwrap().failing_pods.contains(pod) {
            PodStatus {
                phase: PodPhase::Failed,
                message: Some("scripted failure".to_owned()),
            }
        } else {
            PodStatus {
                phase: PodPhase::Succeeded,
                message: None,
            }
        }
    }

    fn delete_fails(&self, kind: &str, name: &str) -> bool {
        self.script
            .lock()
            .unwrap()
            .failing_deletes
            .contains(&(kind.to_owned(), name.to_owned()))
    }

    async fn on_workflow_created(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let namespace = &workflow.metadata.namespace;
        let name = &workflow.metadata.name;

        self.store
            .insert(&Computes {
                metadata: ObjectMeta::new(namespace, name),
                ..Computes::default()
            })
            .await?;

        let mut breakdowns = Vec::new();
        for (index, directive) in workflow.spec.dw_directives.iter().enumerate() {
            let Ok(args) = parse_args(directive) else {
                continue;
            };
            let object_name = format!("{name}-{index}");

            let storage = if args.is(command::JOB_DW) || args.is(command::CREATE_PERSISTENT) {
                self.store
                    .insert(&Servers {
                        metadata: ObjectMeta::new(namespace, &object_name),
                        ..Servers::default()
                    })
                    .await?;
                Some(StorageBreakdown {
                    allocation_sets: vec![StorageAllocationSet {
                        minimum_capacity: 1 << 30,
                        label: args.get("type").unwrap_or("xfs").to_owned(),
                        allocation_strategy: AllocationStrategy::AllocatePerCompute,
                    }],
                    reference: ObjectReference {
                        kind: Servers::KIND.to_owned(),
                        name: object_name.clone(),
                        namespace: namespace.clone(),
                    },
                })
            } else if args.is(command::PERSISTENT_DW) {
                None
            } else {
                continue;
            };

            self.store
                .insert(&DirectiveBreakdown {
                    metadata: ObjectMeta::new(namespace, &object_name),
                    spec: DirectiveBreakdownSpec {
                        directive: directive.clone(),
                    },
                    status: Some(DirectiveBreakdownStatus {
                        ready: true,
                        storage,
                    }),
                })
                .await?;
            breakdowns.push(ObjectReference {
                kind: DirectiveBreakdown::KIND.to_owned(),
                name: object_name,
                namespace: namespace.clone(),
            });
        }

        let (ready, status, message) = self.outcome_for(name, Stage::Proposal);
        let computes = ObjectReference {
            kind: Computes::KIND.to_owned(),
            name: name.clone(),
            namespace: namespace.clone(),
        };
        self.store
            .modify(&workflow.key(), move |wf: &mut Workflow| {
                wf.status = Some(WorkflowStatus {
                    state: Some(Stage::Proposal),
                    ready,
                    status,
                    message,
                    computes,
                    directive_breakdowns: breakdowns,
                    ..WorkflowStatus::default()
                });
            })
            .await?;
        Ok(())
    }

    async fn on_workflow_updated(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let stage = workflow.spec.desired_state;
        let (ready, status, message) = self.outcome_for(&workflow.metadata.name, stage);

        if status == Outcome::Completed {
            for directive in &workflow.spec.dw_directives {
                let Ok(args) = parse_args(directive) else {
                    continue;
                };
                let Some(instance) = args.get("name") else {
                    continue;
                };
                let key = ObjectKey::new(&workflow.metadata.namespace, instance);

                if stage == Stage::Setup && args.is(command::CREATE_PERSISTENT) {
                    self.store
                        .insert(&Storage {
                            metadata: ObjectMeta::new(&key.namespace, &key.name),
                            status: Some(StorageStatus {
                                ready: true,
                                file_system_name: FS_NAME.to_owned(),
                                mgs_address: MGS_NIDS.to_owned(),
                            }),
                            ..Storage::default()
                        })
                        .await?;
                    self.record(Verb::Create, Storage::KIND, key, None);
                } else if stage == Stage::Teardown && args.is(command::DESTROY_PERSISTENT) {
                    match self.store.delete::<Storage>(&key).await {
                        Ok(()) => self.record(Verb::Delete, Storage::KIND, key, None),
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        self.store
            .modify(&workflow.key(), move |wf: &mut Workflow| {
                let current = wf.status.get_or_insert_with(WorkflowStatus::default);
                current.state = Some(stage);
                current.ready = ready;
                current.status = status;
                current.message = message;
            })
            .await?;
        Ok(())
    }
}

impl ResourceStore for FakeCluster {
    async fn get<R: Resource>(&self, key: &ObjectKey) -> Result<R, StoreError> {
        self.store.get(key).await
    }

    async fn create<R: Resource>(&self, obj: &R) -> Result<R, StoreError> {
        let created = self.store.create(obj).await?;
        let key = created.key();

        if R::KIND == Workflow::KIND {
            let workflow: Workflow = convert(&created)?;
            self.record(
                Verb::Create,
                R::KIND,
                key.clone(),
                Some(workflow.spec.desired_state),
            );
            self.on_workflow_created(&workflow).await?;
            return self.store.get(&key).await;
        }

        self.record(Verb::Create, R::KIND, key.clone(), None);
        if R::KIND == Pod::KIND {
            let status = self.pod_status(&key.name);
            self.store
                .modify(&key, move |pod: &mut Pod| pod.status = Some(status))
                .await?;
            return self.store.get(&key).await;
        }
        Ok(created)
    }

    async fn update<R: Resource>(&self, obj: &R) -> Result<R, StoreError> {
        let key = obj.key();
        if R::KIND == Workflow::KIND && self.take_conflict() {
            return Err(StoreError::Conflict {
                kind: R::KIND.to_owned(),
                name: key.to_string(),
            });
        }

        let updated = self.store.update(obj).await?;
        if R::KIND == Workflow::KIND {
            let workflow: Workflow = convert(&updated)?;
            self.record(
                Verb::Update,
                R::KIND,
                key.clone(),
                Some(workflow.spec.desired_state),
            );
            self.on_workflow_updated(&workflow).await?;
            return self.store.get(&key).await;
        }

        self.record(Verb::Update, R::KIND, key, None);
        Ok(updated)
    }

    async fn delete<R: Resource>(&self, key: &ObjectKey) -> Result<(), StoreError> {
        if self.delete_fails(R::KIND, &key.name) {
            return Err(StoreError::Api(format!(
                "scripted delete failure for {} '{key}'",
                R::KIND
            )));
        }
        self.store.delete::<R>(key).await?;
        self.record(Verb::Delete, R::KIND, key.clone(), None);
        Ok(())
    }

    async fn current_context(&self) -> Result<String, StoreError> {
        self.store.current_context().await
    }
}

fn convert<T: Resource, U: Resource>(obj: &T) -> Result<U, StoreError> {
    serde_json::to_value(obj)
        .and_then(serde_json::from_value)
        .map_err(|e| StoreError::Decode {
            kind: U::KIND.to_owned(),
            reason: e.to_string(),
        })
}
