use moka::future::Cache as MokaCache;

use akidb_core::{CacheConfig, CollectionStatus, RepositoryId};

type CountKey = (RepositoryId, Option<CollectionStatus>);

/// TTL cache for derived lookups owned by a [`CatalogAggregator`](crate::CatalogAggregator).
///
/// Holds per-repository count estimates. They only feed strategy routing, so
/// serving them up to `ttl` stale is acceptable. The repository list itself
/// carries access rules and is never cached. When disabled every lookup misses
/// and every write is dropped.
#[derive(Clone)]
pub struct CatalogCache {
    counts: MokaCache<CountKey, u64>,
    enabled: bool,
}

impl CatalogCache {
    pub fn new(config: &CacheConfig) -> Self {
        let counts = MokaCache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl())
            .build();

        Self {
            counts,
            enabled: config.enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn get_count(
        &self,
        repository_id: &RepositoryId,
        status: Option<CollectionStatus>,
    ) -> Option<u64> {
        if !self.enabled {
            return None;
        }
        self.counts.get(&(repository_id.clone(), status)).await
    }

    pub async fn put_count(
        &self,
        repository_id: RepositoryId,
        status: Option<CollectionStatus>,
        count: u64,
    ) {
        if self.enabled {
            self.counts.insert((repository_id, status), count).await;
        }
    }

    /// Drops every cached count for one repository, whatever the status filter.
    pub async fn invalidate_counts(&self, repository_id: &RepositoryId) {
        for status in [
            None,
            Some(CollectionStatus::Active),
            Some(CollectionStatus::Archived),
            Some(CollectionStatus::Deleted),
        ] {
            self.counts.invalidate(&(repository_id.clone(), status)).await;
        }
    }

    pub fn invalidate_all(&self) {
        self.counts.invalidate_all();
    }
}
