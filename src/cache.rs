//! Materialized view of the most popular search phrases over a trailing window.
//!
//! The snapshot (entries plus the instant they were computed) sits behind one
//! `parking_lot::RwLock` and is only ever replaced whole. Storage is never
//! queried while the lock is held.

use crate::config::{CacheConfig, days};
use crate::storage::{SearchStore, StorageError};
use crate::types::{CacheStatus, PopularityEntry};
use chrono::Utc;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

pub const CACHE_CAPACITY: usize = 100;
pub const WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);
pub const STALE_THRESHOLD: Duration = Duration::from_secs(70);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("popularity cache refresh failed: {0}")]
    RefreshFailed(StorageError),

    #[error("direct popularity query failed: {0}")]
    StorageUnavailable(StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub capacity: usize,
    pub window: Duration,
    pub refresh_interval: Duration,
    pub stale_threshold: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: CACHE_CAPACITY,
            window: WINDOW,
            refresh_interval: REFRESH_INTERVAL,
            stale_threshold: STALE_THRESHOLD,
        }
    }
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            capacity: config.capacity,
            window: days(config.window_days),
            refresh_interval: Duration::from_secs(config.refresh_interval_secs),
            stale_threshold: Duration::from_secs(config.stale_threshold_secs),
        }
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    entries: Arc<[PopularityEntry]>,
    last_refreshed_at: Instant,
}

#[derive(Clone)]
pub struct PopularityCache {
    store: Arc<dyn SearchStore>,
    snapshot: Arc<RwLock<Snapshot>>,
    settings: CacheSettings,
}

impl PopularityCache {
    /// Creates an empty cache. Nothing is fetched until the first refresh.
    pub fn new(store: Arc<dyn SearchStore>, settings: CacheSettings) -> Self {
        Self {
            store,
            snapshot: Arc::new(RwLock::new(Snapshot {
                entries: Arc::from(Vec::new()),
                last_refreshed_at: Instant::now(),
            })),
            settings,
        }
    }

    /// Recomputes the top phrases from storage and installs them.
    ///
    /// On failure the current snapshot is left untouched and keeps serving.
    pub async fn refresh(&self) -> Result<(), CacheError> {
        let entries = self
            .store
            .top_by_hits(self.window_start(), self.settings.capacity)
            .await
            .map_err(CacheError::RefreshFailed)?;

        let installed = self.install(entries);
        tracing::debug!(entries = installed, "popularity cache refreshed");
        Ok(())
    }

    /// Spawns a refresh without waiting on it. Failures only reach the logs.
    pub fn trigger_refresh(&self) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.refresh().await {
                tracing::error!(error = %e, "background popularity refresh failed");
            }
        })
    }

    /// Top `limit` phrases, from the snapshot when it holds enough entries and
    /// from storage otherwise.
    pub async fn query(&self, limit: NonZeroUsize) -> Result<Vec<PopularityEntry>, CacheError> {
        let limit = limit.get();

        let (entries, stale) = {
            let mut snapshot = self.snapshot.write();
            let now = Instant::now();
            let stale =
                now.duration_since(snapshot.last_refreshed_at) > self.settings.stale_threshold;
            if stale {
                // Stamp before the refresh lands so concurrent readers don't pile on.
                snapshot.last_refreshed_at = now;
            }
            (Arc::clone(&snapshot.entries), stale)
        };

        if stale {
            tracing::debug!("popularity cache stale, scheduling refresh");
            self.trigger_refresh();
        }

        if limit <= entries.len() {
            return Ok(entries[..limit].to_vec());
        }

        tracing::debug!(
            limit,
            cached = entries.len(),
            "popularity cache too small, querying storage"
        );
        let mut fresh = self
            .store
            .top_by_hits(self.window_start(), limit)
            .await
            .map_err(CacheError::StorageUnavailable)?;
        sort_by_hits(&mut fresh);

        self.install(fresh.iter().take(self.settings.capacity).cloned().collect());
        Ok(fresh)
    }

    /// Runs `refresh` every `refresh_interval` until `shutdown` fires. The
    /// first run happens one interval from now; warm-up is the caller's job.
    pub fn spawn_refresher(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let period = cache.settings.refresh_interval;
            let mut interval = time::interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("popularity refresher stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = cache.refresh().await {
                            tracing::error!(error = %e, "periodic popularity refresh failed");
                        }
                    }
                }
            }
        })
    }

    pub fn status(&self) -> CacheStatus {
        let snapshot = self.snapshot.read();
        CacheStatus {
            entries: snapshot.entries.len(),
            capacity: self.settings.capacity,
            age_secs: snapshot.last_refreshed_at.elapsed().as_secs(),
        }
    }

    /// Current cached entries, highest hit count first.
    #[cfg(test)]
    pub fn entries(&self) -> Vec<PopularityEntry> {
        self.snapshot.read().entries.to_vec()
    }

    fn window_start(&self) -> chrono::DateTime<Utc> {
        let window = chrono::Duration::from_std(self.settings.window)
            .unwrap_or(chrono::Duration::MAX);
        Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC)
    }

    fn install(&self, mut entries: Vec<PopularityEntry>) -> usize {
        sort_by_hits(&mut entries);
        entries.truncate(self.settings.capacity);
        let len = entries.len();

        *self.snapshot.write() = Snapshot {
            entries: Arc::from(entries),
            last_refreshed_at: Instant::now(),
        };
        len
    }
}

/// Stable, so the store's tie-break between equal hit counts survives.
fn sort_by_hits(entries: &mut [PopularityEntry]) {
    entries.sort_by(|a, b| b.hits.cmp(&a.hits));
}
