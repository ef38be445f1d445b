//! In-memory collection store for testing and local development

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use akidb_core::{
    Collection, CollectionId, CollectionPage, CollectionStatus, CollectionStore, CoreError,
    CoreResult, RepositoryId, StoreQuery,
};

use crate::fault::{FaultPlan, StoreOp};

/// In-memory, per-repository collection store.
///
/// Each repository's run is sorted with `SortSpec::compare` on every query.
/// Cursors are offsets into that sorted run, rendered as opaque strings.
#[derive(Clone, Default)]
pub struct MemoryCollectionStore {
    repositories: Arc<RwLock<HashMap<RepositoryId, Vec<Collection>>>>,
    faults: FaultPlan,
    query_calls: Arc<RwLock<HashMap<RepositoryId, u64>>>,
    latency: Arc<RwLock<Option<Duration>>>,
}

impl MemoryCollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a collection, keyed by `(repository_id, collection_id)`.
    pub fn upsert(&self, collection: Collection) {
        let mut repositories = self.repositories.write();
        let run = repositories
            .entry(collection.repository_id.clone())
            .or_default();

        match run
            .iter_mut()
            .find(|c| c.collection_id == collection.collection_id)
        {
            Some(existing) => *existing = collection,
            None => run.push(collection),
        }
    }

    /// Bulk variant of [`upsert`](Self::upsert).
    pub fn extend(&self, collections: impl IntoIterator<Item = Collection>) {
        for collection in collections {
            self.upsert(collection);
        }
    }

    /// Removes a collection, returning it if present.
    pub fn remove(&self, repository_id: &RepositoryId, collection_id: &CollectionId) -> Option<Collection> {
        let mut repositories = self.repositories.write();
        let run = repositories.get_mut(repository_id)?;
        let position = run.iter().position(|c| &c.collection_id == collection_id)?;
        Some(run.remove(position))
    }

    /// Fault plan shared with this store; failures apply on the next matching call.
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Adds a fixed delay to every query and count.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Number of `query` calls (including failed attempts) made against a repository.
    pub fn query_calls(&self, repository_id: &RepositoryId) -> u64 {
        self.query_calls
            .read()
            .get(repository_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_query_calls(&self) -> u64 {
        self.query_calls.read().values().sum()
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn matching(&self, repository_id: &RepositoryId, status: Option<CollectionStatus>) -> Vec<Collection> {
        let repositories = self.repositories.read();
        repositories
            .get(repository_id)
            .map(|run| {
                run.iter()
                    .filter(|c| status.map_or(true, |s| c.status == s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn parse_cursor(cursor: Option<&str>) -> CoreResult<usize> {
    match cursor {
        None => Ok(0),
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| CoreError::ValidationError(format!("malformed cursor `{raw}`"))),
    }
}

#[async_trait]
impl CollectionStore for MemoryCollectionStore {
    async fn query(&self, repository_id: &RepositoryId, query: &StoreQuery) -> CoreResult<CollectionPage> {
        *self
            .query_calls
            .write()
            .entry(repository_id.clone())
            .or_insert(0) += 1;

        self.simulate_latency().await;
        self.faults.check(repository_id, StoreOp::Query)?;

        if query.limit == 0 {
            return Err(CoreError::ValidationError("limit must be > 0".to_string()));
        }

        let offset = parse_cursor(query.cursor.as_deref())?;
        let mut run = self.matching(repository_id, query.status);
        run.sort_by(|a, b| query.sort.compare(a, b));

        let end = offset.saturating_add(query.limit).min(run.len());
        let items = if offset < run.len() {
            run[offset..end].to_vec()
        } else {
            Vec::new()
        };
        let next_cursor = (end < run.len()).then(|| end.to_string());

        Ok(CollectionPage { items, next_cursor })
    }

    async fn count(
        &self,
        repository_id: &RepositoryId,
        status: Option<CollectionStatus>,
    ) -> CoreResult<u64> {
        self.simulate_latency().await;
        self.faults.check(repository_id, StoreOp::Count)?;
        Ok(self.matching(repository_id, status).len() as u64)
    }
}
