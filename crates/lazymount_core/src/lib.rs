//! Client-side module runtime for server-rendered pages.
//!
//! Independently built interactive modules are mounted into page regions.
//! The runtime resolves their bundles from a build manifest, loads each
//! asset once and in order, coerces typed mount point attributes, and hands
//! every module the same page-wide state store, persisted across page loads.

pub mod config;
pub mod db;
pub mod loader;
pub mod logging;
pub mod manifest;
pub mod mount;
pub mod props;
pub mod runtime;
pub mod store;
pub mod trigger;

pub use config::{ConfigError, RuntimeConfig};
pub use db::SqliteStorage;
pub use loader::{AssetFetcher, AssetLoadError, AssetLoader, AssetStatus, FetchError};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use manifest::{AssetDescriptor, AssetKind, BundleManifest, ManifestError};
pub use mount::{
    InstanceId, ModuleFactory, ModuleInstance, ModuleRegistry, MountError, MountPoint,
    MountedModule, PreparedMount,
};
pub use props::{extract, DeclaredType, PropertyValue, TypeCoercionError, TypedProperties};
pub use runtime::{Runtime, RuntimeError, RuntimeResult};
pub use store::{
    DurableStorage, MemoryStorage, StateModule, StorageError, StoreCell, StoreError, StoreHandle,
};
pub use trigger::{LazyTrigger, PageEvent, TriggerCondition, TriggerOutcome, TriggerState};

/// Returns the runtime crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
