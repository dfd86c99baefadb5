//! Asset load records and the singleflight loader.

use crate::loader::fetcher::{AssetFetcher, FetchError};
use crate::manifest::AssetDescriptor;
use log::{debug, error, info};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;

pub type LoadResult<T> = Result<T, AssetLoadError>;

/// Observable status of one URL in the load record table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    Unrequested,
    Pending,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetLoadError {
    /// The platform reported an error for this asset.
    Failed { url: String, message: String },
    /// The fetch task ended without reporting an outcome.
    Abandoned { url: String },
}

impl AssetLoadError {
    pub fn url(&self) -> &str {
        match self {
            Self::Failed { url, .. } | Self::Abandoned { url } => url,
        }
    }
}

impl Display for AssetLoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed { url, message } => write!(f, "asset `{url}` failed to load: {message}"),
            Self::Abandoned { url } => write!(f, "asset `{url}` load ended without an outcome"),
        }
    }
}

impl Error for AssetLoadError {}

type Outcome = Option<Result<(), FetchError>>;

enum AssetRecord {
    Pending(watch::Receiver<Outcome>),
    Loaded,
    Failed(FetchError),
}

type RecordTable = Arc<Mutex<HashMap<String, AssetRecord>>>;

/// Loads asset lists in order, deduplicating by URL for the page lifetime.
///
/// Cloning yields another handle to the same record table.
#[derive(Clone)]
pub struct AssetLoader {
    fetcher: Arc<dyn AssetFetcher>,
    records: RecordTable,
}

impl AssetLoader {
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            fetcher,
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Loads `assets` in order, resolving once all of them are loaded.
    ///
    /// Each asset is awaited before the next one is requested. Assets already
    /// loaded are skipped; assets in flight for another caller are awaited
    /// rather than requested again.
    ///
    /// # Errors
    /// Fails on the first asset that fails; later assets are not requested.
    pub async fn load(&self, assets: &[AssetDescriptor]) -> LoadResult<()> {
        for asset in assets {
            self.ensure_loaded(asset).await?;
        }
        Ok(())
    }

    /// Current status of `url` in the record table.
    pub fn status(&self, url: &str) -> AssetStatus {
        match lock(&self.records).get(url) {
            None => AssetStatus::Unrequested,
            Some(AssetRecord::Pending(_)) => AssetStatus::Pending,
            Some(AssetRecord::Loaded) => AssetStatus::Loaded,
            Some(AssetRecord::Failed(_)) => AssetStatus::Failed,
        }
    }

    /// Number of URLs that have been requested at least once.
    pub fn requested_count(&self) -> usize {
        lock(&self.records).len()
    }

    async fn ensure_loaded(&self, asset: &AssetDescriptor) -> LoadResult<()> {
        let mut receiver = {
            let mut records = lock(&self.records);
            match records.get(&asset.url) {
                Some(AssetRecord::Loaded) => {
                    debug!(
                        "event=asset_load module=loader status=skip reason=loaded url={}",
                        asset.url
                    );
                    return Ok(());
                }
                Some(AssetRecord::Failed(err)) => {
                    debug!(
                        "event=asset_load module=loader status=skip reason=failed url={}",
                        asset.url
                    );
                    return Err(AssetLoadError::Failed {
                        url: asset.url.clone(),
                        message: err.message.clone(),
                    });
                }
                Some(AssetRecord::Pending(receiver)) => {
                    debug!(
                        "event=asset_load module=loader status=attach url={}",
                        asset.url
                    );
                    receiver.clone()
                }
                None => {
                    let (sender, receiver) = watch::channel(None);
                    records.insert(asset.url.clone(), AssetRecord::Pending(receiver.clone()));
                    self.spawn_fetch(asset.clone(), sender);
                    receiver
                }
            }
        };

        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .map(|outcome| (*outcome).clone())
            .ok()
            .flatten();
        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => Err(AssetLoadError::Failed {
                url: asset.url.clone(),
                message: err.message,
            }),
            None => Err(AssetLoadError::Abandoned {
                url: asset.url.clone(),
            }),
        }
    }

    /// Runs the fetch on its own task so a caller-side timeout never leaves
    /// the record stuck in `Pending`.
    fn spawn_fetch(&self, asset: AssetDescriptor, sender: watch::Sender<Outcome>) {
        let fetcher = Arc::clone(&self.fetcher);
        let mut pending = PendingFetch {
            url: asset.url.clone(),
            records: Arc::clone(&self.records),
            sender,
            settled: false,
        };

        tokio::spawn(async move {
            let started_at = Instant::now();
            info!(
                "event=asset_load module=loader status=start url={} kind={}",
                asset.url,
                asset.kind.as_str()
            );

            let outcome = fetcher.fetch(&asset).await;
            match &outcome {
                Ok(()) => info!(
                    "event=asset_load module=loader status=ok url={} duration_ms={}",
                    asset.url,
                    started_at.elapsed().as_millis()
                ),
                Err(err) => error!(
                    "event=asset_load module=loader status=error url={} duration_ms={} error={}",
                    asset.url,
                    started_at.elapsed().as_millis(),
                    err
                ),
            }
            pending.settle(outcome);
        });
    }
}

/// Leader side of one in-flight fetch.
///
/// Settles the record exactly once. If the fetch task ends without an
/// outcome (panic or runtime shutdown) the record is marked `Failed` on drop.
struct PendingFetch {
    url: String,
    records: RecordTable,
    sender: watch::Sender<Outcome>,
    settled: bool,
}

impl PendingFetch {
    fn settle(&mut self, outcome: Result<(), FetchError>) {
        if self.settled {
            return;
        }
        self.settled = true;
        let record = match &outcome {
            Ok(()) => AssetRecord::Loaded,
            Err(err) => AssetRecord::Failed(err.clone()),
        };
        // Record first, then wake waiters, so `status` never lags an outcome.
        lock(&self.records).insert(self.url.clone(), record);
        let _ = self.sender.send(Some(outcome));
    }
}

impl Drop for PendingFetch {
    fn drop(&mut self) {
        if !self.settled {
            error!(
                "event=asset_load module=loader status=error error_code=fetch_aborted url={}",
                self.url
            );
            self.settle(Err(FetchError::new(
                "fetch ended without reporting an outcome",
            )));
        }
    }
}

fn lock(records: &RecordTable) -> MutexGuard<'_, HashMap<String, AssetRecord>> {
    records.lock().unwrap_or_else(PoisonError::into_inner)
}
