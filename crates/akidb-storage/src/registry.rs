//! In-memory repository registry

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use akidb_core::{CoreError, CoreResult, Repository, RepositoryId, RepositoryRegistry};

/// Registry holding a mutable list of repositories in registration order.
#[derive(Clone, Default)]
pub struct MemoryRepositoryRegistry {
    repositories: Arc<RwLock<Vec<Repository>>>,
    unavailable: Arc<AtomicBool>,
    list_calls: Arc<AtomicU64>,
}

impl MemoryRepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repositories(repositories: impl IntoIterator<Item = Repository>) -> Self {
        let registry = Self::new();
        for repository in repositories {
            registry.register(repository);
        }
        registry
    }

    /// Registers a repository, replacing any entry with the same id.
    pub fn register(&self, repository: Repository) {
        let mut repositories = self.repositories.write();
        match repositories
            .iter_mut()
            .find(|r| r.repository_id == repository.repository_id)
        {
            Some(existing) => *existing = repository,
            None => repositories.push(repository),
        }
    }

    pub fn deregister(&self, repository_id: &RepositoryId) -> Option<Repository> {
        let mut repositories = self.repositories.write();
        let position = repositories
            .iter()
            .position(|r| &r.repository_id == repository_id)?;
        Some(repositories.remove(position))
    }

    /// Makes every subsequent `list_registered` call fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryRegistry for MemoryRepositoryRegistry {
    async fn list_registered(&self) -> CoreResult<Vec<Repository>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::unavailable("repository registry is unreachable"));
        }
        Ok(self.repositories.read().clone())
    }
}
