//! Rehydration and write-through of declared persistent paths.

use crate::store::shared::{StoreError, StoreResult};
use crate::store::state::{assign, lookup, StateModule};
use crate::store::storage::DurableStorage;
use log::{debug, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

struct PersistedPath {
    namespace: String,
    path: String,
    key: String,
}

/// Aggregated persistent paths of every declared sub-tree.
pub(crate) struct Persistence {
    storage: Arc<dyn DurableStorage>,
    paths: Vec<PersistedPath>,
}

impl Persistence {
    pub(crate) fn plan(
        storage: Arc<dyn DurableStorage>,
        key_prefix: Option<&str>,
        modules: &[StateModule],
    ) -> Self {
        let paths = modules
            .iter()
            .flat_map(|module| {
                module.persistent_paths.iter().map(move |path| {
                    let qualified = module.qualified(path);
                    PersistedPath {
                        namespace: module.namespace.clone(),
                        path: path.clone(),
                        key: match key_prefix {
                            Some(prefix) => format!("{prefix}.{qualified}"),
                            None => qualified,
                        },
                    }
                })
            })
            .collect();
        Self { storage, paths }
    }

    pub(crate) fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// Seeds `states` from storage. Never fails: unreadable or corrupt
    /// records leave the declared default in place.
    pub(crate) fn rehydrate(&self, states: &mut BTreeMap<String, Value>) -> usize {
        let mut restored = 0;
        for persisted in &self.paths {
            let raw = match self.storage.get(&persisted.key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(err) => {
                    warn!(
                        "event=store_rehydrate module=store status=fallback reason=read_failed key={} error={}",
                        persisted.key, err
                    );
                    continue;
                }
            };
            let value = match serde_json::from_str::<Value>(&raw) {
                Ok(value) => value,
                Err(_) => {
                    warn!(
                        "event=store_rehydrate module=store status=fallback reason=corrupt_record key={}",
                        persisted.key
                    );
                    continue;
                }
            };
            let Some(state) = states.get_mut(&persisted.namespace) else {
                continue;
            };
            if assign(state, &persisted.path, value) {
                restored += 1;
            } else {
                warn!(
                    "event=store_rehydrate module=store status=fallback reason=shape_mismatch key={}",
                    persisted.key
                );
            }
        }
        restored
    }

    /// Writes every declared path of `namespace` from its current `state`.
    ///
    /// Paths absent from the state are removed from storage so the next
    /// construction falls back to the default.
    pub(crate) fn write_through(&self, namespace: &str, state: &Value) -> StoreResult<()> {
        for persisted in self.paths.iter().filter(|p| p.namespace == namespace) {
            let written = match lookup(state, &persisted.path) {
                Some(value) => {
                    let serialized =
                        serde_json::to_string(value).map_err(|err| StoreError::Serialize {
                            key: persisted.key.clone(),
                            message: err.to_string(),
                        })?;
                    self.storage.set(&persisted.key, &serialized)
                }
                None => self.storage.remove(&persisted.key),
            };
            written.map_err(|source| StoreError::Persist {
                key: persisted.key.clone(),
                source,
            })?;
            debug!(
                "event=store_persist module=store status=ok key={}",
                persisted.key
            );
        }
        Ok(())
    }
}
