use crate::types::{PopularityEntry, SearchRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Backing store for search records.
#[async_trait]
pub trait SearchStore: Send + Sync {
    async fn insert(&self, record: SearchRecord) -> Result<(), StorageError>;

    /// Phrases with the most records at or after `window_start`, sorted by
    /// hits descending. Equal hit counts are ordered by phrase ascending.
    async fn top_by_hits(
        &self,
        window_start: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PopularityEntry>, StorageError>;

    /// Most recent phrases searched by `user_id`, newest first.
    async fn recent_for_user(&self, user_id: &str, limit: usize)
    -> Result<Vec<String>, StorageError>;

    /// Drops every record older than `cutoff`, returning how many were removed.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;

    async fn ping(&self) -> Result<(), StorageError>;
}

/// In-process record log
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<SearchRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }
}

#[async_trait]
impl SearchStore for MemoryStore {
    async fn insert(&self, record: SearchRecord) -> Result<(), StorageError> {
        self.records.write().push(record);
        Ok(())
    }

    async fn top_by_hits(
        &self,
        window_start: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PopularityEntry>, StorageError> {
        let mut hits: HashMap<String, u64> = HashMap::new();
        {
            let records = self.records.read();
            for record in records.iter().filter(|r| r.timestamp >= window_start) {
                *hits.entry(record.search_phrase.clone()).or_default() += 1;
            }
        }

        let mut entries: Vec<PopularityEntry> = hits
            .into_iter()
            .map(|(phrase, hits)| PopularityEntry::new(phrase, hits))
            .collect();
        entries.sort_by(|a, b| {
            b.hits
                .cmp(&a.hits)
                .then_with(|| a.search_phrase.cmp(&b.search_phrase))
        });
        entries.truncate(limit);

        Ok(entries)
    }

    async fn recent_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<String>, StorageError> {
        let records = self.records.read();

        // Newest insertions first so the stable sort keeps them ahead on equal timestamps.
        let mut matching: Vec<&SearchRecord> =
            records.iter().rev().filter(|r| r.user_id == user_id).collect();
        matching.sort_by_key(|r| Reverse(r.timestamp));

        Ok(matching
            .into_iter()
            .take(limit)
            .map(|r| r.search_phrase.clone())
            .collect())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.timestamp >= cutoff);
        Ok(before - records.len())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Periodically purges records that fell out of the retention window.
pub fn spawn_retention_sweeper(
    store: Arc<dyn SearchStore>,
    retention: Duration,
    purge_interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(purge_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("retention sweeper stopped");
                    break;
                }
                _ = interval.tick() => {
                    let Ok(retention) = chrono::Duration::from_std(retention) else {
                        tracing::error!(?retention, "retention window out of range");
                        break;
                    };
                    let cutoff = Utc::now() - retention;
                    match store.purge_older_than(cutoff).await {
                        Ok(0) => {}
                        Ok(removed) => tracing::info!(removed, %cutoff, "purged expired search records"),
                        Err(e) => tracing::warn!(error = %e, "failed to purge expired search records"),
                    }
                }
            }
        }
    })
}
