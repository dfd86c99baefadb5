//! Bundle manifest parsing and resolution.

use log::{debug, warn};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub type ManifestResult<T> = Result<T, ManifestError>;

/// How an asset is injected into the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Script,
    Style,
}

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Style => "style",
        }
    }
}

/// One asset of a bundle, as emitted by the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub url: String,
    pub kind: AssetKind,
    #[serde(rename = "contentHash", default)]
    pub content_hash: String,
}

impl AssetDescriptor {
    pub fn script(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: AssetKind::Script,
            content_hash: String::new(),
        }
    }

    pub fn style(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: AssetKind::Style,
            content_hash: String::new(),
        }
    }

    pub fn with_hash(mut self, content_hash: impl Into<String>) -> Self {
        self.content_hash = content_hash.into();
        self
    }
}

/// Manifest construction and lookup errors.
#[derive(Debug)]
pub enum ManifestError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    DuplicateBundle(String),
    EmptyBundleName,
    EmptyAssetUrl { bundle: String },
    UnknownBundle(String),
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read manifest `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid manifest document: {err}"),
            Self::DuplicateBundle(name) => write!(f, "bundle declared more than once: {name}"),
            Self::EmptyBundleName => write!(f, "bundle name must not be empty"),
            Self::EmptyAssetUrl { bundle } => {
                write!(f, "bundle `{bundle}` contains an asset with an empty url")
            }
            Self::UnknownBundle(name) => write!(f, "unknown bundle: {name}"),
        }
    }
}

impl Error for ManifestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

/// Keeps document order and duplicate keys so they can be rejected.
struct BundleEntries(Vec<(String, Vec<AssetDescriptor>)>);

impl<'de> Deserialize<'de> for BundleEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = BundleEntries;

            fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of bundle name to asset list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some(entry) = map.next_entry::<String, Vec<AssetDescriptor>>()? {
                    entries.push(entry);
                }
                Ok(BundleEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Read-only mapping from bundle name to its ordered asset list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleManifest {
    bundles: BTreeMap<String, Vec<AssetDescriptor>>,
}

impl BundleManifest {
    /// Builds a manifest from `(name, assets)` pairs.
    ///
    /// # Errors
    /// - `DuplicateBundle` when a name appears twice.
    /// - `EmptyBundleName` / `EmptyAssetUrl` for blank identifiers.
    pub fn new(
        entries: impl IntoIterator<Item = (String, Vec<AssetDescriptor>)>,
    ) -> ManifestResult<Self> {
        let mut bundles = BTreeMap::new();
        for (name, assets) in entries {
            if name.trim().is_empty() {
                return Err(ManifestError::EmptyBundleName);
            }
            if assets.iter().any(|asset| asset.url.trim().is_empty()) {
                return Err(ManifestError::EmptyAssetUrl { bundle: name });
            }
            if bundles.contains_key(&name) {
                return Err(ManifestError::DuplicateBundle(name));
            }
            bundles.insert(name, assets);
        }
        Ok(Self { bundles })
    }

    /// Parses the build pipeline's JSON manifest.
    pub fn from_json_str(raw: &str) -> ManifestResult<Self> {
        let BundleEntries(entries) = serde_json::from_str(raw).map_err(ManifestError::Parse)?;
        let manifest = Self::new(entries)?;
        debug!(
            "event=manifest_load module=manifest status=ok bundles={}",
            manifest.len()
        );
        Ok(manifest)
    }

    pub fn load(path: impl AsRef<Path>) -> ManifestResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Returns the ordered assets of `bundle_name`.
    ///
    /// Dependency chunks precede dependent chunks in the returned slice.
    pub fn resolve(&self, bundle_name: &str) -> ManifestResult<&[AssetDescriptor]> {
        match self.bundles.get(bundle_name) {
            Some(assets) => Ok(assets.as_slice()),
            None => {
                warn!(
                    "event=bundle_resolve module=manifest status=error error_code=unknown_bundle bundle={}",
                    bundle_name
                );
                Err(ManifestError::UnknownBundle(bundle_name.to_string()))
            }
        }
    }

    pub fn contains(&self, bundle_name: &str) -> bool {
        self.bundles.contains_key(bundle_name)
    }

    pub fn bundle_names(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{AssetDescriptor, AssetKind, BundleManifest, ManifestError};

    const SAMPLE: &str = r#"{
        "vendor": [{"url": "/v.js", "kind": "script", "contentHash": "abc123"}],
        "widget": [
            {"url": "/v.js", "kind": "script", "contentHash": "abc123"},
            {"url": "/w.css", "kind": "style", "contentHash": "f00"},
            {"url": "/w.js", "kind": "script"}
        ]
    }"#;

    #[test]
    fn resolves_assets_in_declared_order() {
        let manifest = BundleManifest::from_json_str(SAMPLE).unwrap();
        let urls: Vec<&str> = manifest
            .resolve("widget")
            .unwrap()
            .iter()
            .map(|asset| asset.url.as_str())
            .collect();
        assert_eq!(urls, ["/v.js", "/w.css", "/w.js"]);
    }

    #[test]
    fn missing_content_hash_defaults_to_empty() {
        let manifest = BundleManifest::from_json_str(SAMPLE).unwrap();
        let assets = manifest.resolve("widget").unwrap();
        assert_eq!(assets[1].kind, AssetKind::Style);
        assert_eq!(assets[2].content_hash, "");
    }

    #[test]
    fn unknown_bundle_is_rejected() {
        let manifest = BundleManifest::from_json_str(SAMPLE).unwrap();
        let err = manifest.resolve("checkout").unwrap_err();
        assert!(matches!(err, ManifestError::UnknownBundle(name) if name == "checkout"));
    }

    #[test]
    fn duplicate_bundle_names_are_rejected() {
        let raw = r#"{"a": [], "a": [{"url": "/x.js", "kind": "script"}]}"#;
        let err = BundleManifest::from_json_str(raw).unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateBundle(name) if name == "a"));
    }

    #[test]
    fn rejects_unknown_kind_and_empty_url() {
        let bad_kind = r#"{"a": [{"url": "/x.wasm", "kind": "wasm"}]}"#;
        assert!(matches!(
            BundleManifest::from_json_str(bad_kind),
            Err(ManifestError::Parse(_))
        ));

        let err = BundleManifest::new([("a".to_string(), vec![AssetDescriptor::script(" ")])])
            .unwrap_err();
        assert!(matches!(err, ManifestError::EmptyAssetUrl { .. }));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let manifest = BundleManifest::load(&path).unwrap();
        assert_eq!(manifest.bundle_names().collect::<Vec<_>>(), ["vendor", "widget"]);
    }
}
