//! Load-once asset loading.
//!
//! # Responsibility
//! - Load each distinct asset URL at most once per page lifetime.
//! - Load a bundle's assets strictly in manifest order.
//!
//! # Invariants
//! - At most one in-flight fetch per URL; concurrent requesters share it.
//! - An asset's fetch starts only after every earlier asset of the same
//!   bundle reported loaded.
//! - `Failed` is terminal; failed URLs are never refetched automatically.

mod asset_loader;
mod fetcher;

pub use asset_loader::{AssetLoadError, AssetLoader, AssetStatus, LoadResult};
pub use fetcher::{AssetFetcher, FetchError};
