//! Run-level guards: triage marker, developer reservation, hardware detection.

use flowtest_core::error::StoreError;
use flowtest_core::resources::{ConfigMap, DEFAULT_NAMESPACE, Namespace, ObjectKey, ObjectMeta};
use tracing::{debug, error, info, warn};

use crate::error::HarnessError;
use crate::store::{ResourceStore, get_opt};

/// Key in the reservation config map naming who holds the system.
pub const RESERVATION_DEVELOPER_KEY: &str = "developer";

/// Context substring identifying a kind cluster without real hardware.
const KIND_CONTEXT_MARKER: &str = "kind";

/// Whether hardware-required cases can run against the store's cluster.
///
/// A context that cannot be determined is assumed to have hardware.
pub async fn hardware_available<S: ResourceStore>(store: &S) -> bool {
    match store.current_context().await {
        Ok(context) => {
            let available = !context.contains(KIND_CONTEXT_MARKER);
            debug!(context = %context, available, "detected cluster context");
            available
        }
        Err(e) => {
            warn!(error = %e, "could not read current context, assuming hardware");
            true
        }
    }
}

/// Fails if the triage namespace exists.
pub async fn check_triage<S: ResourceStore>(store: &S, namespace: &str) -> Result<(), HarnessError> {
    let marker = get_opt::<S, Namespace>(store, &ObjectKey::cluster(namespace)).await?;
    if marker.is_some() {
        error!(namespace, "system requires triage");
        return Err(HarnessError::TriageRequired {
            namespace: namespace.to_owned(),
        });
    }
    Ok(())
}

/// Creates the triage namespace so later runs refuse to start.
///
/// An existing marker is left as is.
pub async fn mark_triage<S: ResourceStore>(store: &S, namespace: &str) -> Result<(), HarnessError> {
    let marker = Namespace {
        metadata: ObjectMeta::new("", namespace),
    };
    match store.create(&marker).await {
        Ok(_) => {
            info!(namespace, "marked system for triage");
            Ok(())
        }
        Err(StoreError::AlreadyExists { .. }) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Fails if the reservation config map exists, naming the developer.
pub async fn check_reservation<S: ResourceStore>(store: &S, name: &str) -> Result<(), HarnessError> {
    let key = ObjectKey::new(DEFAULT_NAMESPACE, name);
    let Some(reservation) = get_opt::<S, ConfigMap>(store, &key).await? else {
        return Ok(());
    };
    let developer = reservation
        .data
        .get(RESERVATION_DEVELOPER_KEY)
        .cloned()
        .unwrap_or_else(|| "unknown".to_owned());
    Err(HarnessError::Reserved { developer })
}
