use async_trait::async_trait;

use crate::collection::CollectionStatus;
use crate::error::CoreResult;
use crate::ids::RepositoryId;
use crate::query::{CollectionPage, StoreQuery};
use crate::repository::Repository;

/// Per-repository collection store consulted by the aggregation engine.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Returns one page of the repository's collections.
    ///
    /// Items are ordered by `query.sort` (see `SortSpec::compare`) and the
    /// page resumes after `query.cursor`. `next_cursor` is `None` when the
    /// repository holds no further matching items.
    async fn query(&self, repository_id: &RepositoryId, query: &StoreQuery) -> CoreResult<CollectionPage>;

    /// Best-effort count of the repository's collections. May be approximate.
    async fn count(
        &self,
        repository_id: &RepositoryId,
        status: Option<CollectionStatus>,
    ) -> CoreResult<u64>;
}

/// Registry of repositories provisioned by the external lifecycle manager.
#[async_trait]
pub trait RepositoryRegistry: Send + Sync {
    /// Returns a point-in-time snapshot of every registered repository.
    async fn list_registered(&self) -> CoreResult<Vec<Repository>>;
}
