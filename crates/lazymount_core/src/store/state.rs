//! State sub-tree declarations.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Synchronous mutation over one sub-tree: `(state, payload)`.
pub type MutationFn = Arc<dyn Fn(&mut Value, &Value) + Send + Sync>;

/// Declaration of one namespaced state sub-tree.
///
/// `persistent_paths` are dot-separated paths relative to the sub-tree; they
/// are stored under `<namespace>.<path>`.
#[derive(Clone)]
pub struct StateModule {
    pub(crate) namespace: String,
    pub(crate) initial: Value,
    pub(crate) persistent_paths: Vec<String>,
    pub(crate) mutations: BTreeMap<String, MutationFn>,
}

impl StateModule {
    pub fn new(namespace: impl Into<String>, initial: Value) -> Self {
        Self {
            namespace: namespace.into(),
            initial,
            persistent_paths: Vec::new(),
            mutations: BTreeMap::new(),
        }
    }

    /// Declares paths whose values survive page loads.
    pub fn persist<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.persistent_paths
            .extend(paths.into_iter().map(Into::into));
        self
    }

    /// Declares a named mutation entry point.
    pub fn mutation<F>(mut self, name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&mut Value, &Value) + Send + Sync + 'static,
    {
        self.mutations.insert(name.into(), Arc::new(apply));
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn initial(&self) -> &Value {
        &self.initial
    }

    pub fn persistent_paths(&self) -> &[String] {
        &self.persistent_paths
    }

    pub fn mutation_names(&self) -> impl Iterator<Item = &str> {
        self.mutations.keys().map(String::as_str)
    }

    pub(crate) fn qualified(&self, path: &str) -> String {
        format!("{}.{path}", self.namespace)
    }
}

impl Debug for StateModule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateModule")
            .field("namespace", &self.namespace)
            .field("persistent_paths", &self.persistent_paths)
            .field("mutations", &self.mutations.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Reads the value at a dot-separated `path`.
pub(crate) fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

/// Writes `value` at a dot-separated `path`, creating intermediate objects.
///
/// Returns `false` when a non-object value sits on the path.
pub(crate) fn assign(root: &mut Value, path: &str, value: Value) -> bool {
    let mut segments = path.split('.').peekable();
    let mut node = root;
    while let Some(segment) = segments.next() {
        let Some(object) = node.as_object_mut() else {
            return false;
        };
        if segments.peek().is_none() {
            object.insert(segment.to_string(), value);
            return true;
        }
        node = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::{assign, lookup, StateModule};
    use serde_json::json;

    #[test]
    fn lookup_follows_nested_objects() {
        let state = json!({"prefs": {"theme": "dark"}, "count": 1});
        assert_eq!(lookup(&state, "prefs.theme"), Some(&json!("dark")));
        assert_eq!(lookup(&state, "count"), Some(&json!(1)));
        assert_eq!(lookup(&state, "count.deep"), None);
        assert_eq!(lookup(&state, "missing"), None);
    }

    #[test]
    fn assign_creates_intermediate_objects() {
        let mut state = json!({"count": 0});
        assert!(assign(&mut state, "prefs.theme", json!("light")));
        assert!(assign(&mut state, "count", json!(4)));
        assert_eq!(state, json!({"count": 4, "prefs": {"theme": "light"}}));
        assert!(!assign(&mut state, "count.deep", json!(1)));
    }

    #[test]
    fn builder_collects_paths_and_mutations() {
        let module = StateModule::new("cart", json!({"items": []}))
            .persist(["items"])
            .mutation("clear", |state, _| state["items"] = json!([]));
        assert_eq!(module.persistent_paths(), ["items"]);
        assert_eq!(module.mutation_names().collect::<Vec<_>>(), ["clear"]);
        assert_eq!(module.qualified("items"), "cart.items");
    }
}
