//! [`ResourceStore`] backed by the `kubectl` binary.
//!
//! Objects travel as JSON on stdin/stdout. Failures are classified from the
//! API server's message on stderr.

use std::process::Stdio;

use flowtest_core::error::StoreError;
use flowtest_core::resources::{ObjectKey, Resource};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::trace;

use super::ResourceStore;

/// Production store that shells out to `kubectl`.
///
/// Uses whatever kubeconfig and context `kubectl` itself would use.
#[derive(Debug, Clone)]
pub struct KubectlStore {
    kubectl: String,
}

impl KubectlStore {
    /// Uses the given `kubectl` executable (a bare name is looked up on `PATH`).
    pub fn new(kubectl: impl Into<String>) -> Self {
        Self {
            kubectl: kubectl.into(),
        }
    }

    async fn run(&self, args: &[&str], stdin: Option<Vec<u8>>) -> Result<Vec<u8>, StoreError> {
        trace!(kubectl = %self.kubectl, ?args, "running kubectl");

        let mut child = Command::new(&self.kubectl)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StoreError::Api(format!("failed to spawn {}: {e}", self.kubectl)))?;

        if let Some(input) = stdin {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| StoreError::Api("kubectl stdin unavailable".to_owned()))?;
            pipe.write_all(&input)
                .await
                .map_err(|e| StoreError::Api(format!("failed to write kubectl stdin: {e}")))?;
            // stdin을 닫아야 kubectl이 입력 끝을 인식함
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| StoreError::Api(format!("kubectl did not finish: {e}")))?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(StoreError::Api(
                String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            ))
        }
    }

    /// Runs a command addressed at one object, classifying failures.
    async fn run_for<R: Resource>(
        &self,
        key: &ObjectKey,
        args: &[&str],
        stdin: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, StoreError> {
        self.run(args, stdin).await.map_err(|e| match e {
            StoreError::Api(stderr) => classify::<R>(key, stderr),
            other => other,
        })
    }
}

impl Default for KubectlStore {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl ResourceStore for KubectlStore {
    async fn get<R: Resource>(&self, key: &ObjectKey) -> Result<R, StoreError> {
        let mut args = vec!["get", R::RESOURCE, key.name.as_str(), "-o", "json"];
        if !key.is_cluster_scoped() {
            args.extend(["-n", key.namespace.as_str()]);
        }
        let out = self.run_for::<R>(key, &args, None).await?;
        decode(&out)
    }

    async fn create<R: Resource>(&self, obj: &R) -> Result<R, StoreError> {
        let body = encode(obj)?;
        let out = self
            .run_for::<R>(&obj.key(), &["create", "-f", "-", "-o", "json"], Some(body))
            .await?;
        decode(&out)
    }

    async fn update<R: Resource>(&self, obj: &R) -> Result<R, StoreError> {
        let body = encode(obj)?;
        let out = self
            .run_for::<R>(&obj.key(), &["replace", "-f", "-", "-o", "json"], Some(body))
            .await?;
        decode(&out)
    }

    async fn delete<R: Resource>(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let mut args = vec!["delete", R::RESOURCE, key.name.as_str(), "--wait=false"];
        if !key.is_cluster_scoped() {
            args.extend(["-n", key.namespace.as_str()]);
        }
        self.run_for::<R>(key, &args, None).await.map(|_| ())
    }

    async fn current_context(&self) -> Result<String, StoreError> {
        let out = self.run(&["config", "current-context"], None).await?;
        Ok(String::from_utf8_lossy(&out).trim_end().to_owned())
    }
}

/// Serializes an object with `apiVersion` and `kind` set.
fn encode<R: Resource>(obj: &R) -> Result<Vec<u8>, StoreError> {
    let mut value = serde_json::to_value(obj).map_err(|e| StoreError::Decode {
        kind: R::KIND.to_owned(),
        reason: e.to_string(),
    })?;
    if let Value::Object(map) = &mut value {
        map.insert("apiVersion".to_owned(), Value::from(R::API_VERSION));
        map.insert("kind".to_owned(), Value::from(R::KIND));
    }
    serde_json::to_vec(&value).map_err(|e| StoreError::Decode {
        kind: R::KIND.to_owned(),
        reason: e.to_string(),
    })
}

fn decode<R: Resource>(bytes: &[u8]) -> Result<R, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Decode {
        kind: R::KIND.to_owned(),
        reason: e.to_string(),
    })
}

/// Maps `kubectl` stderr onto the store error variants.
fn classify<R: Resource>(key: &ObjectKey, stderr: String) -> StoreError {
    let kind = R::KIND.to_owned();
    let name = key.to_string();
    if stderr.contains("(NotFound)") || stderr.contains("not found") {
        StoreError::NotFound { kind, name }
    } else if stderr.contains("(AlreadyExists)") || stderr.contains("already exists") {
        StoreError::AlreadyExists { kind, name }
    } else if stderr.contains("(Conflict)") || stderr.contains("the object has been modified") {
        StoreError::Conflict { kind, name }
    } else {
        StoreError::Api(stderr)
    }
}
