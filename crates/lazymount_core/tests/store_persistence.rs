use async_trait::async_trait;
use lazymount_core::{
    AssetDescriptor, AssetFetcher, BundleManifest, DurableStorage, FetchError, ModuleInstance,
    MountError, MountPoint, Runtime, RuntimeConfig, RuntimeError, SqliteStorage, StateModule,
    StoreHandle, TypedProperties,
};
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};

struct InstantFetcher;

#[async_trait]
impl AssetFetcher for InstantFetcher {
    async fn fetch(&self, _asset: &AssetDescriptor) -> Result<(), FetchError> {
        Ok(())
    }
}

struct Holder;

impl ModuleInstance for Holder {}

type Captured = Arc<Mutex<Vec<StoreHandle>>>;

fn counter_state() -> StateModule {
    StateModule::new("counter", json!({"count": 0, "lastClicked": null}))
        .persist(["count"])
        .mutation("add", |state, payload| {
            let next = state["count"].as_i64().unwrap_or(0) + payload.as_i64().unwrap_or(0);
            state["count"] = json!(next);
            state["lastClicked"] = json!("now");
        })
}

fn cart_state() -> StateModule {
    StateModule::new("cart", json!({"items": []})).persist(["items"])
}

fn register_capturing(runtime: &Runtime, module_type: &str, state: Vec<StateModule>) -> Captured {
    let captured: Captured = Arc::default();
    let sink = Arc::clone(&captured);
    runtime
        .register_module_with_state(
            module_type,
            move |_props: TypedProperties, store: Option<StoreHandle>| {
                if let Some(store) = store {
                    sink.lock().unwrap().push(store);
                }
                Box::new(Holder) as Box<dyn ModuleInstance>
            },
            state,
        )
        .unwrap();
    captured
}

fn sqlite_runtime(path: &Path) -> Runtime {
    let manifest = BundleManifest::from_json_str(r#"{"counter": [{"url": "/c.js", "kind": "script"}]}"#)
        .unwrap();
    let config = RuntimeConfig::default().with_storage_namespace("site");
    let storage = Arc::new(SqliteStorage::open(path).unwrap());
    Runtime::new(config, manifest, Arc::new(InstantFetcher), storage).unwrap()
}

#[tokio::test]
async fn every_module_gets_the_first_constructed_store() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = sqlite_runtime(&dir.path().join("state.db"));
    let counters = register_capturing(&runtime, "counter", vec![counter_state()]);
    let carts = register_capturing(&runtime, "cart", vec![cart_state()]);
    let plain = register_capturing(&runtime, "banner", Vec::new());

    assert!(runtime.existing_store().is_none());
    runtime
        .mount_bundle("counter", &MountPoint::new("c1", "counter"))
        .await
        .unwrap();
    runtime.mount(&MountPoint::new("c2", "cart")).unwrap();
    runtime.mount(&MountPoint::new("b1", "banner")).unwrap();

    let first = counters.lock().unwrap()[0].clone();
    let second = carts.lock().unwrap()[0].clone();
    assert!(first.ptr_eq(&second));
    assert!(plain.lock().unwrap().is_empty());
    assert_eq!(second.namespaces(), ["counter"]);
    assert!(second.get("cart").is_none());
    assert!(runtime.existing_store().unwrap().ptr_eq(&first));
}

#[tokio::test]
async fn rejected_mount_does_not_fix_the_store_declarations() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = sqlite_runtime(&dir.path().join("state.db"));
    let counters = register_capturing(&runtime, "counter", vec![counter_state()]);
    let carts = register_capturing(&runtime, "cart", vec![cart_state()]);

    let bad = MountPoint::new("bad", "counter").with_typed_attribute("data-n", "x", "Number");
    let err = runtime.mount(&bad).unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Mount(MountError::Coercion { ref mount_id, .. }) if mount_id == "bad"
    ));
    assert!(runtime.existing_store().is_none());
    assert!(counters.lock().unwrap().is_empty());

    runtime.mount(&MountPoint::new("c1", "cart")).unwrap();
    let store = carts.lock().unwrap()[0].clone();
    assert_eq!(store.namespaces(), ["cart"]);
    assert_eq!(store.get("cart"), Some(json!({"items": []})));
}

#[tokio::test]
async fn persisted_paths_survive_a_page_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");

    let runtime = sqlite_runtime(&path);
    let captured = register_capturing(&runtime, "counter", vec![counter_state()]);
    runtime
        .mount_bundle("counter", &MountPoint::new("c1", "counter"))
        .await
        .unwrap();
    let store = captured.lock().unwrap()[0].clone();
    store.commit("counter", "add", &json!(2)).unwrap();
    store.commit("counter", "add", &json!(3)).unwrap();
    assert_eq!(store.get_path("counter.lastClicked"), Some(json!("now")));
    drop(store);
    runtime.teardown();

    let raw = SqliteStorage::open(&path).unwrap();
    assert_eq!(raw.get("site.counter.count").unwrap().as_deref(), Some("5"));
    assert_eq!(raw.get("site.counter.lastClicked").unwrap(), None);
    drop(raw);

    let reloaded = sqlite_runtime(&path);
    let captured = register_capturing(&reloaded, "counter", vec![counter_state()]);
    reloaded
        .mount_bundle("counter", &MountPoint::new("c1", "counter"))
        .await
        .unwrap();
    let store = captured.lock().unwrap()[0].clone();
    assert_eq!(
        store.get("counter"),
        Some(json!({"count": 5, "lastClicked": null}))
    );
}

#[tokio::test]
async fn corrupt_persisted_value_falls_back_to_declared_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    SqliteStorage::open(&path)
        .unwrap()
        .set("site.counter.count", "not-json")
        .unwrap();

    let runtime = sqlite_runtime(&path);
    let store = runtime.store(&[counter_state()]);
    assert_eq!(store.get_path("counter.count"), Some(json!(0)));

    store.commit("counter", "add", &json!(1)).unwrap();
    assert_eq!(store.get_path("counter.count"), Some(json!(1)));
}
