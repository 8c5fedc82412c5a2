//! Remote object store abstraction.
//!
//! Everything the harness reads or writes goes through [`ResourceStore`].
//! Production code uses [`KubectlStore`]; tests and cluster-less embedders use
//! [`MemoryStore`].
//!
//! ```text
//!   driver / preparer / helper
//!              │
//!              ▼
//!       ┌──────────────┐
//!       │ResourceStore │ (trait)
//!       └──────────────┘
//!          │        │
//!          ▼        ▼
//!     ┌───────┐ ┌──────┐
//!     │kubectl│ │memory│
//!     └───┬───┘ └──────┘
//!         ▼
//!     API server
//! ```

mod kubectl;
mod memory;

use std::future::Future;
use std::time::Duration;

use flowtest_core::error::StoreError;
use flowtest_core::resources::{ObjectKey, Resource};
use tracing::debug;

use crate::error::HarnessError;
use crate::wait::poll_until;

pub use kubectl::KubectlStore;
pub use memory::MemoryStore;

/// Keyed get/create/update/delete over typed objects.
///
/// The trait is `Send + Sync + 'static` so one store can be shared by cases
/// running on different tasks.
///
/// # Errors
///
/// - `StoreError::NotFound`: no object under the key
/// - `StoreError::AlreadyExists`: `create` on an existing key
/// - `StoreError::Conflict`: `update` carried a stale `resourceVersion`
/// - `StoreError::Api` / `StoreError::Decode`: everything else
pub trait ResourceStore: Send + Sync + 'static {
    /// Reads one object.
    fn get<R: Resource>(&self, key: &ObjectKey)
    -> impl Future<Output = Result<R, StoreError>> + Send;

    /// Creates an object and returns it as stored.
    fn create<R: Resource>(&self, obj: &R) -> impl Future<Output = Result<R, StoreError>> + Send;

    /// Replaces an object. The caller's `resourceVersion` must be current.
    fn update<R: Resource>(&self, obj: &R) -> impl Future<Output = Result<R, StoreError>> + Send;

    /// Requests deletion. Returns once the request is accepted, not once the
    /// object is gone; see [`wait_for_deletion`].
    fn delete<R: Resource>(&self, key: &ObjectKey)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Name of the cluster context the store talks to.
    fn current_context(&self) -> impl Future<Output = Result<String, StoreError>> + Send;
}

/// Reads an object, mapping `NotFound` to `None`.
pub async fn get_opt<S, R>(store: &S, key: &ObjectKey) -> Result<Option<R>, StoreError>
where
    S: ResourceStore,
    R: Resource,
{
    match store.get::<R>(key).await {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Polls until `key` no longer resolves.
pub async fn wait_for_deletion<S, R>(
    store: &S,
    key: &ObjectKey,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), HarnessError>
where
    S: ResourceStore,
    R: Resource,
{
    let gone = poll_until(timeout, poll_interval, || async move {
        Ok(get_opt::<S, R>(store, key).await?.is_none().then_some(()))
    })
    .await?;

    match gone {
        Some(()) => {
            debug!(kind = R::KIND, name = %key, "deletion confirmed");
            Ok(())
        }
        None => Err(HarnessError::NotDeleted {
            kind: R::KIND.to_owned(),
            name: key.to_string(),
        }),
    }
}

/// Deletes an object and waits for it to disappear.
///
/// An object that is already gone counts as deleted.
pub async fn delete_and_wait<S, R>(
    store: &S,
    key: &ObjectKey,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), HarnessError>
where
    S: ResourceStore,
    R: Resource,
{
    match store.delete::<R>(key).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            debug!(kind = R::KIND, name = %key, "already deleted");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }
    wait_for_deletion::<S, R>(store, key, timeout, poll_interval).await
}
