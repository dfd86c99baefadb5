//! Platform seam for injecting one asset.

use crate::manifest::AssetDescriptor;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Platform-reported failure for one asset (network, parse, integrity).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for FetchError {}

/// Injects or fetches a single asset and resolves on its load/error signal.
///
/// Implementations must not return before the asset's code is usable: the
/// loader starts the next asset of a bundle as soon as this future resolves.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, asset: &AssetDescriptor) -> Result<(), FetchError>;
}
