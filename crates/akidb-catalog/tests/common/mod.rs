//! Shared fixtures for the catalog integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use akidb_catalog::{
    CallerIdentity, CatalogAggregator, EnrichedCollection, ListCollectionsRequest,
    PaginationStrategy,
};
use akidb_core::{CatalogConfig, Collection, Repository, RetryConfig, SortSpec};
use akidb_storage::{MemoryCollectionStore, MemoryRepositoryRegistry};
use chrono::{DateTime, Duration, TimeZone, Utc};

pub struct Fixture {
    pub registry: MemoryRepositoryRegistry,
    pub store: MemoryCollectionStore,
}

impl Fixture {
    pub fn new(repositories: impl IntoIterator<Item = Repository>) -> Self {
        Self {
            registry: MemoryRepositoryRegistry::with_repositories(repositories),
            store: MemoryCollectionStore::new(),
        }
    }

    pub fn aggregator(&self, config: CatalogConfig) -> CatalogAggregator {
        CatalogAggregator::new(
            Arc::new(self.registry.clone()),
            Arc::new(self.store.clone()),
            config,
        )
    }
}

/// Fast retries, no caching, and the given routing threshold.
pub fn test_config(simple_threshold: u64) -> CatalogConfig {
    let mut config = CatalogConfig::default();
    config.pagination.simple_threshold = simple_threshold;
    config.retry = RetryConfig {
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 4,
        backoff_multiplier: 2.0,
        jitter_percent: 0.0,
    };
    config.cache.enabled = false;
    config
}

pub const FORCE_SIMPLE: u64 = u64::MAX;
pub const FORCE_SCALABLE: u64 = 0;

pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
}

/// Three repositories from the catalog's reference scenario.
pub fn reference_fixture() -> Fixture {
    let fixture = Fixture::new([
        Repository::new("repo-1", "Finance").with_allowed_groups(["g1", "g2"]),
        Repository::new("repo-2", "Legal").with_allowed_groups(["g2", "g3"]),
        Repository::new("repo-3", "Scratch"),
    ]);
    fixture.store.extend([
        Collection::new("repo-1", "c-public", "Quarterly reports", "u1"),
        Collection::new("repo-1", "c-private", "Salaries", "u2").with_private(true),
        Collection::new("repo-2", "c-contracts", "Contracts", "u3"),
    ]);
    fixture
}

/// `repos` repositories with `per_repo` collections each, with unique
/// timestamps and names that interleave across repositories.
pub fn bulk_fixture(repos: usize, per_repo: usize) -> Fixture {
    let fixture = Fixture::new(
        (0..repos).map(|r| Repository::new(format!("repo-{r}"), format!("Repository {r}"))),
    );
    for r in 0..repos {
        for i in 0..per_repo {
            let minute = (i * repos + r) as i64;
            fixture.store.upsert(
                Collection::new(
                    format!("repo-{r}"),
                    format!("c-{r}-{i:04}"),
                    format!("collection {i:04} / {r}"),
                    "owner",
                )
                .with_timestamps(at(minute), at(minute)),
            );
        }
    }
    fixture
}

pub struct Sequence {
    pub items: Vec<EnrichedCollection>,
    pub page_sizes: Vec<usize>,
    pub strategies: Vec<Option<PaginationStrategy>>,
}

impl Sequence {
    pub fn ids(&self) -> Vec<(String, String)> {
        self.items
            .iter()
            .map(|e| {
                (
                    e.collection.repository_id.to_string(),
                    e.collection.collection_id.to_string(),
                )
            })
            .collect()
    }
}

/// Follows `next_page_token` until the terminal page.
pub async fn paginate(
    aggregator: &CatalogAggregator,
    caller: &CallerIdentity,
    page_size: usize,
    filter: Option<&str>,
    sort: SortSpec,
) -> Sequence {
    let mut sequence = Sequence {
        items: Vec::new(),
        page_sizes: Vec::new(),
        strategies: Vec::new(),
    };
    let mut token: Option<String> = None;

    loop {
        let mut request = ListCollectionsRequest::new(caller.clone(), page_size)
            .with_sort(sort)
            .with_page_token(token.take());
        if let Some(text) = filter {
            request = request.with_filter(text);
        }
        let response = aggregator.list(request).await.expect("list failed");

        sequence.page_sizes.push(response.collections.len());
        sequence.strategies.push(response.strategy);
        sequence.items.extend(response.collections);

        match response.next_page_token {
            Some(next) => token = Some(next),
            None => return sequence,
        }
        assert!(sequence.page_sizes.len() < 10_000, "pagination did not terminate");
    }
}

/// Every page but the last is full; the last is at most full.
pub fn assert_page_bound(sequence: &Sequence, page_size: usize) {
    let (last, full) = sequence
        .page_sizes
        .split_last()
        .expect("at least one page");
    assert!(full.iter().all(|n| *n == page_size), "short non-terminal page: {:?}", sequence.page_sizes);
    assert!(*last <= page_size);
}

pub fn assert_no_duplicates(sequence: &Sequence) {
    let mut seen = HashSet::new();
    for id in sequence.ids() {
        assert!(seen.insert(id.clone()), "duplicate collection {id:?}");
    }
}

pub fn assert_sorted(sequence: &Sequence, sort: SortSpec) {
    for pair in sequence.items.windows(2) {
        assert_eq!(
            sort.compare(&pair[0].collection, &pair[1].collection),
            std::cmp::Ordering::Less,
            "out of order: {} then {}",
            pair[0].collection.collection_id,
            pair[1].collection.collection_id
        );
    }
}
