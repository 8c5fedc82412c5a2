//! Helper pods that seed and verify data on the global Lustre mount.
//!
//! A helper runs on the first storage node with the global mount's
//! read-write-many claim mounted at the mount root:
//!
//! - `copy-in`: `/copy-in.sh <mountRoot> <relativePath> <uid> <gid>` places the
//!   source file before the workflow runs.
//! - `copy-out`: `/copy-out.sh <source> <destination> <count>` checks that
//!   DataOut produced the expected copies.
//!
//! Every launched pod is recorded on the case so cleanup can remove it.

use std::fmt;

use flowtest_core::metrics as m;
use flowtest_core::resources::{
    Container, ObjectKey, ObjectMeta, PersistentVolumeClaimSource, Pod, PodPhase, PodSpec,
    Resource, Volume, VolumeMount, owner_labels,
};
use metrics::counter;
use tracing::{info, warn};

use crate::allocator::system_configuration;
use crate::case::{GlobalMount, TestCase};
use crate::error::HarnessError;
use crate::run_config::{DELETION_TIMEOUT, HELPER_TIMEOUT, RunConfig};
use crate::store::{ResourceStore, delete_and_wait};
use crate::wait::poll_until;

/// Which helper script a pod runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperScript {
    CopyIn,
    CopyOut,
}

impl HelperScript {
    /// Pod name suffix and container name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CopyIn => "copy-in",
            Self::CopyOut => "copy-out",
        }
    }

    /// Entrypoint inside the helper image.
    pub fn command(&self) -> &'static str {
        match self {
            Self::CopyIn => "/copy-in.sh",
            Self::CopyOut => "/copy-out.sh",
        }
    }
}

impl fmt::Display for HelperScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arguments for `/copy-in.sh`. The source path is made relative to the
/// mount root by stripping the first `<mountRoot>/`.
pub fn copy_in_args(mount_root: &str, source: &str, user_id: u32, group_id: u32) -> Vec<String> {
    let relative = source.replacen(&format!("{mount_root}/"), "", 1);
    vec![
        mount_root.to_owned(),
        relative,
        user_id.to_string(),
        group_id.to_string(),
    ]
}

/// Arguments for `/copy-out.sh`.
///
/// A destination with per-compute index directories (`*/`) expects one copy
/// per assigned compute, and its `*` is escaped so the script's shell does
/// not glob it. Otherwise the expected count is `0`.
pub fn copy_out_args(source: &str, destination: &str, computes: usize) -> Vec<String> {
    let (destination, count) = if destination.contains("*/") {
        (destination.replace('*', "\\*"), computes)
    } else {
        (destination.to_owned(), 0)
    };
    vec![source.to_owned(), destination, count.to_string()]
}

/// Pod spec for a helper run by `case` against `mount`.
pub fn helper_pod(
    case: &TestCase,
    mount: &GlobalMount,
    script: HelperScript,
    args: Vec<String>,
    node_name: &str,
    image: &str,
) -> Pod {
    let workflow = case.workflow();
    let namespace = workflow.metadata.namespace.clone();
    let claim_name = format!("{}-{namespace}-readwritemany-pvc", mount.name);

    let mut metadata = ObjectMeta::new(
        &namespace,
        format!("{}-{}", workflow.metadata.name, script.name()),
    );
    metadata.labels = owner_labels(workflow);

    Pod {
        metadata,
        spec: PodSpec {
            restart_policy: "Never".to_owned(),
            node_name: node_name.to_owned(),
            containers: vec![Container {
                name: script.name().to_owned(),
                image: image.to_owned(),
                image_pull_policy: "Always".to_owned(),
                command: vec![script.command().to_owned()],
                args,
                volume_mounts: vec![VolumeMount {
                    name: mount.name.clone(),
                    mount_path: mount.mount_root.clone(),
                }],
            }],
            volumes: vec![Volume {
                name: mount.name.clone(),
                persistent_volume_claim: Some(PersistentVolumeClaimSource { claim_name }),
            }],
            extra: Default::default(),
        },
        status: None,
    }
}

/// Launches a helper pod and waits for it to succeed.
///
/// A `Failed` phase ends the wait immediately.
pub async fn run_helper<S: ResourceStore>(
    store: &S,
    run: &RunConfig,
    case: &mut TestCase,
    script: HelperScript,
    args: Vec<String>,
) -> Result<(), HarnessError> {
    let mount = case
        .options()
        .global_mount
        .clone()
        .ok_or_else(|| HarnessError::Invariant("helper pod requires a global mount".to_owned()))?;

    let system = system_configuration(store).await?;
    let node_name = &system.spec.storage_nodes[0].name;

    let pod = helper_pod(case, &mount, script, args, node_name, &run.helper_image);
    let key = pod.key();
    info!(pod = %key, node = %node_name, helper = %script, "starting helper pod");

    store.create(&pod).await?;
    case.helper_pods.push(key.clone());

    let result = poll_until(HELPER_TIMEOUT, run.poll_interval, || {
        let key = &key;
        async move {
            let pod: Pod = store.get(key).await?;
            match pod.phase() {
                PodPhase::Succeeded => Ok(Some(())),
                PodPhase::Failed => Err(HarnessError::HelperFailed {
                    pod: key.to_string(),
                    reason: pod
                        .status
                        .and_then(|s| s.message)
                        .unwrap_or_else(|| "pod phase Failed".to_owned()),
                }),
                _ => Ok(None),
            }
        }
    })
    .await
    .and_then(|done| {
        done.ok_or_else(|| HarnessError::WaitTimeout {
            what: format!("helper pod '{key}' to succeed"),
            timeout: HELPER_TIMEOUT,
        })
    });

    let outcome = if result.is_ok() { "succeeded" } else { "failed" };
    counter!(m::HELPER_PODS_TOTAL, m::LABEL_HELPER => script.name(), m::LABEL_RESULT => outcome)
        .increment(1);
    result
}

/// Seeds the copy-in source on the global mount, if one is configured.
pub async fn setup_copy_in<S: ResourceStore>(
    store: &S,
    run: &RunConfig,
    case: &mut TestCase,
) -> Result<(), HarnessError> {
    let args = match case.options().global_mount.as_ref() {
        Some(GlobalMount {
            mount_root,
            source: Some(source),
            ..
        }) => {
            let spec = &case.workflow().spec;
            copy_in_args(mount_root, source, spec.user_id, spec.group_id)
        }
        _ => return Ok(()),
    };
    run_helper(store, run, case, HelperScript::CopyIn, args).await
}

/// Verifies the copy-out destination after DataOut, if one is configured.
pub async fn verify_copy_out<S: ResourceStore>(
    store: &S,
    run: &RunConfig,
    case: &mut TestCase,
) -> Result<(), HarnessError> {
    let computes = case.computes().map_or(0, |c| c.data.len());
    let args = match case.options().global_mount.as_ref() {
        Some(GlobalMount {
            source,
            destination: Some(destination),
            ..
        }) => copy_out_args(source.as_deref().unwrap_or_default(), destination, computes),
        _ => return Ok(()),
    };
    run_helper(store, run, case, HelperScript::CopyOut, args).await
}

/// Deletes every helper pod launched for the case.
///
/// All pods are attempted; the first failure is returned.
pub async fn cleanup_helper_pods<S: ResourceStore>(
    store: &S,
    run: &RunConfig,
    case: &mut TestCase,
) -> Result<(), HarnessError> {
    let mut first_error = None;
    for key in std::mem::take(&mut case.helper_pods) {
        info!(pod = %key, "deleting helper pod");
        let deleted =
            delete_and_wait::<S, Pod>(store, &key, DELETION_TIMEOUT, run.poll_interval).await;
        if let Err(e) = deleted {
            warn!(pod = %key, error = %e, "failed to delete helper pod");
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Key of the helper pod `script` would create for `case`.
pub fn helper_pod_key(case: &TestCase, script: HelperScript) -> ObjectKey {
    ObjectKey::new(
        &case.workflow().metadata.namespace,
        format!("{}-{}", case.workflow_name(), script.name()),
    )
}
