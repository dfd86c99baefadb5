//! The shared store, its handle and the per-page singleton cell.

use crate::store::persist::Persistence;
use crate::store::state::{lookup, MutationFn, StateModule};
use crate::store::storage::{DurableStorage, StorageError};
use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    UnknownNamespace(String),
    UnknownMutation { namespace: String, mutation: String },
    Serialize { key: String, message: String },
    /// The mutation was applied in memory but could not be written through.
    Persist { key: String, source: StorageError },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownNamespace(namespace) => write!(f, "unknown state namespace: {namespace}"),
            Self::UnknownMutation {
                namespace,
                mutation,
            } => write!(f, "unknown mutation `{mutation}` in namespace `{namespace}`"),
            Self::Serialize { key, message } => {
                write!(f, "failed to serialize `{key}`: {message}")
            }
            Self::Persist { key, source } => write!(f, "failed to persist `{key}`: {source}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Persist { source, .. } => Some(source),
            _ => None,
        }
    }
}

struct Slot {
    state: Value,
    mutations: BTreeMap<String, MutationFn>,
}

struct StoreInner {
    slots: Mutex<BTreeMap<String, Slot>>,
    persistence: Persistence,
}

/// Handle to the page's shared store. Clones refer to the same store.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<StoreInner>,
}

impl StoreHandle {
    fn construct(
        modules: &[StateModule],
        storage: Arc<dyn DurableStorage>,
        key_prefix: Option<&str>,
    ) -> Self {
        let started_at = Instant::now();

        let mut declared: Vec<StateModule> = Vec::with_capacity(modules.len());
        for module in modules {
            if declared.iter().any(|d| d.namespace == module.namespace) {
                warn!(
                    "event=store_construct module=store status=skip reason=duplicate_namespace namespace={}",
                    module.namespace
                );
                continue;
            }
            declared.push(module.clone());
        }

        let persistence = Persistence::plan(storage, key_prefix, &declared);
        let mut states: BTreeMap<String, Value> = declared
            .iter()
            .map(|module| (module.namespace.clone(), module.initial.clone()))
            .collect();
        let restored = persistence.rehydrate(&mut states);

        let slots = declared
            .into_iter()
            .map(|module| {
                let state = states
                    .remove(&module.namespace)
                    .unwrap_or_else(|| module.initial.clone());
                (
                    module.namespace,
                    Slot {
                        state,
                        mutations: module.mutations,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        info!(
            "event=store_construct module=store status=ok namespaces={} persisted_paths={} restored={} duration_ms={}",
            slots.len(),
            persistence.path_count(),
            restored,
            started_at.elapsed().as_millis()
        );

        Self {
            inner: Arc::new(StoreInner {
                slots: Mutex::new(slots),
                persistence,
            }),
        }
    }

    /// Snapshot of one sub-tree.
    pub fn get(&self, namespace: &str) -> Option<Value> {
        self.slots().get(namespace).map(|slot| slot.state.clone())
    }

    /// Reads `<namespace>.<path>`.
    pub fn get_path(&self, qualified: &str) -> Option<Value> {
        let (namespace, path) = qualified.split_once('.')?;
        let slots = self.slots();
        let value = lookup(&slots.get(namespace)?.state, path).cloned();
        value
    }

    /// Runs a named mutation and writes the sub-tree's persisted paths.
    ///
    /// The store lock is held until the write-through finishes, so no reader
    /// sees a value newer than the last persisted snapshot. Mutations must not
    /// call back into the store.
    ///
    /// # Errors
    /// - `UnknownNamespace` / `UnknownMutation`: nothing changes.
    /// - `Serialize` / `Persist`: the in-memory change stays applied; no retry.
    pub fn commit(&self, namespace: &str, mutation: &str, payload: &Value) -> StoreResult<()> {
        let mut slots = self.slots();
        let slot = slots
            .get_mut(namespace)
            .ok_or_else(|| StoreError::UnknownNamespace(namespace.to_string()))?;
        let apply = slot
            .mutations
            .get(mutation)
            .cloned()
            .ok_or_else(|| StoreError::UnknownMutation {
                namespace: namespace.to_string(),
                mutation: mutation.to_string(),
            })?;

        apply(&mut slot.state, payload);

        match self.inner.persistence.write_through(namespace, &slot.state) {
            Ok(()) => {
                debug!(
                    "event=store_commit module=store status=ok namespace={} mutation={}",
                    namespace, mutation
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=store_commit module=store status=error namespace={} mutation={} error={}",
                    namespace, mutation, err
                );
                Err(err)
            }
        }
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.slots().keys().cloned().collect()
    }

    /// Whether both handles point at the same store instance.
    pub fn ptr_eq(&self, other: &StoreHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn slots(&self) -> MutexGuard<'_, BTreeMap<String, Slot>> {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Debug for StoreHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("namespaces", &self.namespaces())
            .finish()
    }
}

/// Memoizes store construction for one page lifetime.
pub struct StoreCell {
    storage: Arc<dyn DurableStorage>,
    key_prefix: Option<String>,
    cell: OnceCell<StoreHandle>,
}

impl StoreCell {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self {
            storage,
            key_prefix: None,
            cell: OnceCell::new(),
        }
    }

    /// Prefixes every persistence key, e.g. `site.counter.count`.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Returns the page store, constructing it from `declarations` on the
    /// first call only. Later declarations are ignored.
    pub fn get_or_create(&self, declarations: &[StateModule]) -> StoreHandle {
        if let Some(handle) = self.cell.get() {
            if !declarations.is_empty() {
                debug!(
                    "event=store_construct module=store status=skip reason=already_initialized ignored_namespaces={}",
                    declarations.len()
                );
            }
            return handle.clone();
        }

        self.cell
            .get_or_init(|| {
                StoreHandle::construct(
                    declarations,
                    Arc::clone(&self.storage),
                    self.key_prefix.as_deref(),
                )
            })
            .clone()
    }

    pub fn get(&self) -> Option<StoreHandle> {
        self.cell.get().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{StoreCell, StoreError};
    use crate::store::state::StateModule;
    use crate::store::storage::{DurableStorage, MemoryStorage, StorageError, StorageResult};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn counter() -> StateModule {
        StateModule::new("counter", json!({"count": 0}))
            .persist(["count"])
            .mutation("add", |state, payload| {
                let next = state["count"].as_i64().unwrap_or(0) + payload.as_i64().unwrap_or(0);
                state["count"] = json!(next);
            })
    }

    fn draft() -> StateModule {
        StateModule::new("draft", json!({"text": ""})).mutation("set", |state, payload| {
            state["text"] = payload.clone();
        })
    }

    struct ReadOnlyStorage;

    impl DurableStorage for ReadOnlyStorage {
        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }

        fn remove(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }
    }

    #[test]
    fn persisted_path_round_trips_through_fresh_store() {
        let storage = Arc::new(MemoryStorage::new());
        let first = StoreCell::new(storage.clone()).get_or_create(&[counter(), draft()]);
        first.commit("counter", "add", &json!(3)).unwrap();
        first.commit("draft", "set", &json!("hello")).unwrap();
        assert_eq!(storage.snapshot().get("counter.count").map(String::as_str), Some("3"));

        let second = StoreCell::new(storage).get_or_create(&[counter(), draft()]);
        assert_eq!(second.get_path("counter.count"), Some(json!(3)));
        assert_eq!(second.get("draft"), Some(json!({"text": ""})));
    }

    #[test]
    fn later_declarations_are_ignored() {
        let cell = StoreCell::new(Arc::new(MemoryStorage::new()));
        let first = cell.get_or_create(&[counter()]);
        first.commit("counter", "add", &json!(2)).unwrap();

        let other = StateModule::new("counter", json!({"count": 100}));
        let second = cell.get_or_create(&[other, draft()]);
        assert!(first.ptr_eq(&second));
        assert_eq!(second.get_path("counter.count"), Some(json!(2)));
        assert_eq!(second.namespaces(), ["counter"]);
    }

    #[test]
    fn corrupt_record_falls_back_to_default() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("counter.count", "{not json").unwrap();
        let store = StoreCell::new(storage).get_or_create(&[counter()]);
        assert_eq!(store.get_path("counter.count"), Some(json!(0)));
    }

    #[test]
    fn unknown_mutation_leaves_state_untouched() {
        let store = StoreCell::new(Arc::new(MemoryStorage::new())).get_or_create(&[counter()]);
        let err = store.commit("counter", "reset", &Value::Null).unwrap_err();
        assert!(matches!(err, StoreError::UnknownMutation { .. }));
        let err = store.commit("cart", "add", &Value::Null).unwrap_err();
        assert!(matches!(err, StoreError::UnknownNamespace(_)));
        assert_eq!(store.get("counter"), Some(json!({"count": 0})));
    }

    #[test]
    fn persist_failure_is_reported_after_applying_mutation() {
        let store = StoreCell::new(Arc::new(ReadOnlyStorage)).get_or_create(&[counter()]);
        let err = store.commit("counter", "add", &json!(1)).unwrap_err();
        assert!(matches!(err, StoreError::Persist { ref key, .. } if key == "counter.count"));
        assert_eq!(store.get_path("counter.count"), Some(json!(1)));
    }

    #[test]
    fn key_prefix_namespaces_storage_keys() {
        let storage = Arc::new(MemoryStorage::new());
        let store = StoreCell::new(storage.clone())
            .with_key_prefix("shop")
            .get_or_create(&[counter()]);
        store.commit("counter", "add", &json!(5)).unwrap();
        assert_eq!(storage.snapshot().get("shop.counter.count").map(String::as_str), Some("5"));
    }
}
