//! In-memory [`ResourceStore`].
//!
//! Objects are kept as JSON keyed by kind and [`ObjectKey`], with a
//! monotonically increasing `resourceVersion` per write so optimistic
//! concurrency behaves like an API server's.

use std::collections::BTreeMap;

use flowtest_core::error::StoreError;
use flowtest_core::resources::{ObjectKey, Resource};
use serde_json::Value;
use tokio::sync::Mutex;

use super::ResourceStore;

#[derive(Default)]
struct State {
    objects: BTreeMap<(String, ObjectKey), Value>,
    version: u64,
}

/// Store holding everything in process memory.
pub struct MemoryStore {
    state: Mutex<State>,
    context: String,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_context("memory")
    }

    /// Store reporting `context` from [`ResourceStore::current_context`].
    pub fn with_context(context: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            context: context.into(),
        }
    }

    /// Stores an object as-is, replacing any existing one. Seeds fixtures.
    pub async fn insert<R: Resource>(&self, obj: &R) -> Result<(), StoreError> {
        let value = to_value(obj)?;
        let mut state = self.state.lock().await;
        let version = state.next_version();
        state
            .objects
            .insert((R::KIND.to_owned(), obj.key()), stamp(value, version));
        Ok(())
    }

    /// Whether an object of `kind` exists under `key`.
    pub async fn contains(&self, kind: &str, key: &ObjectKey) -> bool {
        let state = self.state.lock().await;
        state.objects.contains_key(&(kind.to_owned(), key.clone()))
    }

    /// Keys of every stored object of `kind`.
    pub async fn keys(&self, kind: &str) -> Vec<ObjectKey> {
        let state = self.state.lock().await;
        state
            .objects
            .keys()
            .filter(|(k, _)| k == kind)
            .map(|(_, key)| key.clone())
            .collect()
    }

    /// Applies `f` to a stored object in place, bypassing version checks.
    ///
    /// Returns `NotFound` if the object does not exist.
    pub async fn modify<R, F>(&self, key: &ObjectKey, f: F) -> Result<R, StoreError>
    where
        R: Resource,
        F: FnOnce(&mut R),
    {
        let mut state = self.state.lock().await;
        let slot = (R::KIND.to_owned(), key.clone());
        let current = state.objects.get(&slot).cloned().ok_or_else(|| not_found::<R>(key))?;
        let mut obj: R = from_value(current)?;
        f(&mut obj);
        let version = state.next_version();
        let value = stamp(to_value(&obj)?, version);
        state.objects.insert(slot, value.clone());
        from_value(value)
    }
}

impl State {
    fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

impl ResourceStore for MemoryStore {
    async fn get<R: Resource>(&self, key: &ObjectKey) -> Result<R, StoreError> {
        let state = self.state.lock().await;
        let value = state
            .objects
            .get(&(R::KIND.to_owned(), key.clone()))
            .cloned()
            .ok_or_else(|| not_found::<R>(key))?;
        from_value(value)
    }

    async fn create<R: Resource>(&self, obj: &R) -> Result<R, StoreError> {
        let key = obj.key();
        let mut state = self.state.lock().await;
        let slot = (R::KIND.to_owned(), key.clone());
        if state.objects.contains_key(&slot) {
            return Err(StoreError::AlreadyExists {
                kind: R::KIND.to_owned(),
                name: key.to_string(),
            });
        }
        let version = state.next_version();
        let value = stamp(to_value(obj)?, version);
        state.objects.insert(slot, value.clone());
        from_value(value)
    }

    async fn update<R: Resource>(&self, obj: &R) -> Result<R, StoreError> {
        let key = obj.key();
        let mut state = self.state.lock().await;
        let slot = (R::KIND.to_owned(), key.clone());
        let stored_version = state
            .objects
            .get(&slot)
            .ok_or_else(|| not_found::<R>(&key))?
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
            .map(str::to_owned);

        if let Some(given) = &obj.metadata().resource_version {
            if stored_version.as_deref() != Some(given.as_str()) {
                return Err(StoreError::Conflict {
                    kind: R::KIND.to_owned(),
                    name: key.to_string(),
                });
            }
        }

        let version = state.next_version();
        let value = stamp(to_value(obj)?, version);
        state.objects.insert(slot, value.clone());
        from_value(value)
    }

    async fn delete<R: Resource>(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .objects
            .remove(&(R::KIND.to_owned(), key.clone()))
            .map(|_| ())
            .ok_or_else(|| not_found::<R>(key))
    }

    async fn current_context(&self) -> Result<String, StoreError> {
        Ok(self.context.clone())
    }
}

fn not_found<R: Resource>(key: &ObjectKey) -> StoreError {
    StoreError::NotFound {
        kind: R::KIND.to_owned(),
        name: key.to_string(),
    }
}

fn to_value<R: Resource>(obj: &R) -> Result<Value, StoreError> {
    serde_json::to_value(obj).map_err(|e| StoreError::Decode {
        kind: R::KIND.to_owned(),
        reason: e.to_string(),
    })
}

fn from_value<R: Resource>(value: Value) -> Result<R, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Decode {
        kind: R::KIND.to_owned(),
        reason: e.to_string(),
    })
}

fn stamp(mut value: Value, version: u64) -> Value {
    if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.insert(
            "resourceVersion".to_owned(),
            Value::from(version.to_string()),
        );
    }
    value
}
