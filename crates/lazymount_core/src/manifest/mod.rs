//! Build-time bundle manifest.
//!
//! The manifest is produced by an external build pipeline, loaded once at
//! page start and read-only afterwards. Lookups fail before any asset is
//! requested so an unknown bundle never causes partial side effects.

mod bundle;

pub use bundle::{AssetDescriptor, AssetKind, BundleManifest, ManifestError, ManifestResult};
