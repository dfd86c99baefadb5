//! Page-level composition root.
//!
//! # Responsibility
//! - Own every page-lifetime resource: manifest, asset records, module
//!   registry, store cell and lazy triggers.
//! - Sequence the eager path (load, then mount) and the lazy path (event,
//!   trigger, load, mount).
//!
//! # Invariants
//! - Bundle names are resolved before any asset is requested.
//! - The store is resolved before a module factory that declares state runs.
//! - Component failures are returned to the caller, never escalated.

use crate::config::RuntimeConfig;
use crate::loader::{AssetFetcher, AssetLoadError, AssetLoader};
use crate::logging::{init_logging, LoggingError};
use crate::manifest::{BundleManifest, ManifestError};
use crate::mount::{ModuleFactory, ModuleRegistry, MountError, MountPoint, MountedModule};
use crate::store::{DurableStorage, StateModule, StoreCell, StoreHandle};
use crate::trigger::{LazyTrigger, PageEvent, TriggerCondition, TriggerOutcome};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug)]
pub enum RuntimeError {
    Manifest(ManifestError),
    AssetLoad(AssetLoadError),
    LoadTimeout { bundle: String, timeout: Duration },
    Mount(MountError),
    DuplicateTrigger(String),
    Logging(LoggingError),
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manifest(err) => write!(f, "{err}"),
            Self::AssetLoad(err) => write!(f, "{err}"),
            Self::LoadTimeout { bundle, timeout } => write!(
                f,
                "bundle `{bundle}` did not load within {}ms",
                timeout.as_millis()
            ),
            Self::Mount(err) => write!(f, "{err}"),
            Self::DuplicateTrigger(bundle) => {
                write!(f, "bundle `{bundle}` already has a lazy trigger")
            }
            Self::Logging(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Manifest(err) => Some(err),
            Self::AssetLoad(err) => Some(err),
            Self::LoadTimeout { .. } | Self::DuplicateTrigger(_) => None,
            Self::Mount(err) => Some(err),
            Self::Logging(err) => Some(err),
        }
    }
}

impl From<ManifestError> for RuntimeError {
    fn from(value: ManifestError) -> Self {
        Self::Manifest(value)
    }
}

impl From<AssetLoadError> for RuntimeError {
    fn from(value: AssetLoadError) -> Self {
        Self::AssetLoad(value)
    }
}

impl From<MountError> for RuntimeError {
    fn from(value: MountError) -> Self {
        Self::Mount(value)
    }
}

impl From<LoggingError> for RuntimeError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

/// Module runtime for one page lifetime.
pub struct Runtime {
    config: RuntimeConfig,
    manifest: BundleManifest,
    loader: AssetLoader,
    registry: Mutex<ModuleRegistry>,
    store: StoreCell,
    triggers: Mutex<Vec<Arc<LazyTrigger>>>,
}

impl Runtime {
    /// Builds the page runtime. Starts file logging when `config.log_dir` is set.
    pub fn new(
        config: RuntimeConfig,
        manifest: BundleManifest,
        fetcher: Arc<dyn AssetFetcher>,
        storage: Arc<dyn DurableStorage>,
    ) -> RuntimeResult<Self> {
        if let Some(log_dir) = &config.log_dir {
            init_logging(config.log_level, log_dir)?;
        }

        let store = match &config.storage_namespace {
            Some(prefix) => StoreCell::new(storage).with_key_prefix(prefix.clone()),
            None => StoreCell::new(storage),
        };

        info!(
            "event=runtime_start module=runtime status=ok bundles={} load_timeout_ms={}",
            manifest.len(),
            config
                .load_timeout
                .map_or_else(|| "none".to_string(), |t| t.as_millis().to_string())
        );

        Ok(Self {
            config,
            manifest,
            loader: AssetLoader::new(fetcher),
            registry: Mutex::new(ModuleRegistry::new()),
            store,
            triggers: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    pub fn loader(&self) -> &AssetLoader {
        &self.loader
    }

    pub fn register_module(
        &self,
        module_type: impl Into<String>,
        factory: impl ModuleFactory + 'static,
    ) -> RuntimeResult<()> {
        self.registry()
            .register(module_type, factory)
            .map_err(RuntimeError::from)
    }

    pub fn register_module_with_state(
        &self,
        module_type: impl Into<String>,
        factory: impl ModuleFactory + 'static,
        state: Vec<StateModule>,
    ) -> RuntimeResult<()> {
        self.registry()
            .register_with_state(module_type, factory, state)
            .map_err(RuntimeError::from)
    }

    /// Returns the page store, constructing it from `declarations` if this is
    /// the first request.
    pub fn store(&self, declarations: &[StateModule]) -> StoreHandle {
        self.store.get_or_create(declarations)
    }

    /// The page store if some module already requested it.
    pub fn existing_store(&self) -> Option<StoreHandle> {
        self.store.get()
    }

    /// Resolves `bundle` and loads its assets in order.
    ///
    /// When `load_timeout` is configured the wait is abandoned after it
    /// elapses; in-flight fetches keep running and still update the asset
    /// records.
    pub async fn load_bundle(&self, bundle: &str) -> RuntimeResult<()> {
        let started_at = Instant::now();
        let assets = self.manifest.resolve(bundle)?;

        let result = match self.config.load_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.loader.load(assets))
                .await
                .map_err(|_| RuntimeError::LoadTimeout {
                    bundle: bundle.to_string(),
                    timeout,
                })
                .and_then(|loaded| loaded.map_err(RuntimeError::from)),
            None => self.loader.load(assets).await.map_err(RuntimeError::from),
        };

        match &result {
            Ok(()) => info!(
                "event=bundle_load module=runtime status=ok bundle={} assets={} duration_ms={}",
                bundle,
                assets.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=bundle_load module=runtime status=error bundle={} duration_ms={} error={}",
                bundle,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    /// Mounts `mount_point` with code that is already loaded.
    ///
    /// The mount point is validated and its properties extracted before the
    /// page store is touched, so a rejected mount never fixes the store's
    /// declarations. The factory runs without the registry lock held.
    pub fn mount(&self, mount_point: &MountPoint) -> RuntimeResult<Arc<MountedModule>> {
        let prepared = self.registry().prepare(mount_point)?;
        let store = match prepared.state_declarations() {
            [] => None,
            declarations => Some(self.store.get_or_create(declarations)),
        };
        let mounted = prepared.create(store);
        self.registry().attach(mounted).map_err(RuntimeError::from)
    }

    /// Loads `bundle`, then mounts `mount_point`. Nothing is mounted when the
    /// load fails.
    pub async fn mount_bundle(
        &self,
        bundle: &str,
        mount_point: &MountPoint,
    ) -> RuntimeResult<Arc<MountedModule>> {
        self.load_bundle(bundle).await?;
        self.mount(mount_point)
    }

    /// Registers a deferred bundle that loads and mounts on the first event
    /// matching `condition`.
    ///
    /// # Errors
    /// `DuplicateTrigger` when `bundle` already has a trigger; each bundle
    /// gets one load attempt per page lifetime.
    pub fn register_lazy(
        &self,
        bundle: impl Into<String>,
        condition: TriggerCondition,
        mount_point: MountPoint,
    ) -> RuntimeResult<Arc<LazyTrigger>> {
        let bundle = bundle.into();
        let mut triggers = self.lock_triggers();
        if triggers.iter().any(|existing| existing.bundle() == bundle) {
            warn!(
                "event=trigger_register module=runtime status=error error_code=duplicate_trigger bundle={}",
                bundle
            );
            return Err(RuntimeError::DuplicateTrigger(bundle));
        }
        let trigger = Arc::new(LazyTrigger::new(bundle, condition, mount_point));
        triggers.push(Arc::clone(&trigger));
        Ok(trigger)
    }

    /// Delivers `event` to every registered trigger whose condition matches.
    ///
    /// Returns one outcome per matching trigger, in registration order.
    pub async fn dispatch_event(&self, event: &PageEvent) -> Vec<TriggerOutcome> {
        let matching: Vec<Arc<LazyTrigger>> = self
            .lock_triggers()
            .iter()
            .filter(|trigger| trigger.matches(event))
            .cloned()
            .collect();

        let mut outcomes = Vec::with_capacity(matching.len());
        for trigger in matching {
            outcomes.push(trigger.fire(event, self).await);
        }
        outcomes
    }

    pub fn mounted(&self, mount_id: &str) -> Option<Arc<MountedModule>> {
        self.registry().get(mount_id)
    }

    pub fn mounted_count(&self) -> usize {
        self.registry().mounted_count()
    }

    pub fn unmount(&self, mount_id: &str) -> RuntimeResult<()> {
        self.registry()
            .unmount(mount_id)
            .map_err(RuntimeError::from)
    }

    /// Ends the page lifetime: every instance is unmounted and the store,
    /// asset records and triggers are dropped.
    pub fn teardown(self) {
        let mut registry = self
            .registry
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let count = registry.mounted_count();
        registry.unmount_all();
        info!(
            "event=runtime_teardown module=runtime status=ok unmounted={}",
            count
        );
    }

    fn registry(&self) -> MutexGuard<'_, ModuleRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_triggers(&self) -> MutexGuard<'_, Vec<Arc<LazyTrigger>>> {
        self.triggers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
