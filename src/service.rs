use crate::cache::PopularityCache;
use crate::config::StorageConfig;
use crate::error::ServiceError;
use crate::storage::{SearchStore, StorageError, spawn_retention_sweeper};
use crate::types::{CacheStatus, PopularityEntry, SearchRecord};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Query surface offered to the router: writes and recency reads go straight
/// to storage, popularity reads go through the cache.
pub struct SearchService {
    store: Arc<dyn SearchStore>,
    cache: PopularityCache,
}

impl SearchService {
    pub fn new(store: Arc<dyn SearchStore>, cache: PopularityCache) -> Self {
        Self { store, cache }
    }

    /// Warms the cache, then starts the periodic refresher and the retention
    /// sweeper. A failed warm-up is logged; the cache starts empty and the
    /// refresher keeps trying.
    pub async fn start(
        &self,
        storage: &StorageConfig,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        match self.cache.refresh().await {
            Ok(()) => tracing::info!(
                entries = self.cache.status().entries,
                "popularity cache warmed up"
            ),
            Err(e) => tracing::error!(error = %e, "initial popularity refresh failed"),
        }

        vec![
            self.cache.spawn_refresher(shutdown.clone()),
            spawn_retention_sweeper(
                Arc::clone(&self.store),
                storage.retention(),
                storage.purge_interval(),
                shutdown,
            ),
        ]
    }

    pub async fn record_search(
        &self,
        user_id: Option<&str>,
        search_phrase: Option<&str>,
    ) -> Result<(), ServiceError> {
        let (Some(user_id), Some(search_phrase)) = (
            user_id.filter(|s| !is_blank(s)),
            search_phrase.filter(|s| !is_blank(s)),
        ) else {
            return Err(ServiceError::invalid("Missing userId or searchPhrase"));
        };

        self.store
            .insert(SearchRecord::new(user_id, search_phrase))
            .await?;
        tracing::debug!(user_id, search_phrase, "search recorded");
        Ok(())
    }

    pub async fn last_searches(
        &self,
        user_id: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<String>, ServiceError> {
        let (Some(user_id), Some(limit)) = (user_id.filter(|s| !is_blank(s)), limit) else {
            return Err(ServiceError::invalid("Missing userId or limit"));
        };
        let limit = positive_limit(limit)?;

        Ok(self.store.recent_for_user(user_id, limit.get()).await?)
    }

    pub async fn most_popular(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<PopularityEntry>, ServiceError> {
        let limit = limit.ok_or_else(|| ServiceError::invalid("Missing limit"))?;
        let limit = positive_limit(limit)?;

        Ok(self.cache.query(limit).await?)
    }

    pub async fn health(&self) -> Result<(), StorageError> {
        self.store.ping().await
    }

    pub fn cache_status(&self) -> CacheStatus {
        self.cache.status()
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn positive_limit(limit: i64) -> Result<NonZeroUsize, ServiceError> {
    usize::try_from(limit)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| ServiceError::invalid("limit must be a positive integer"))
}
