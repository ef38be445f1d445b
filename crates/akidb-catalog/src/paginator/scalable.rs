//! Cursor-based k-way merge across repositories.
//!
//! Each repository is a "lane": a sorted run read in batches of
//! `page_size * batch_multiplier` from the store. Lanes are merged through a
//! min-heap holding at most one head per lane. A lane is refilled (one
//! concurrent round per batch, barrier between rounds) whenever its buffer
//! runs dry, and the heap is popped only when every live lane has its head
//! queued, so the merged stream is in global order.
//!
//! Nothing survives the call except the token. Per lane it records the
//! cursor the lane's current batch was fetched from, the sort key last
//! emitted out of that batch and the ids emitted at exactly that key. The
//! next call re-fetches the batch and skips everything up to the key.
//!
//! A lane that cannot be read is empty for the call but keeps its position,
//! so the sequence resumes it later. After `max_partition_failures`
//! consecutive failed calls it is given up on.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

use akidb_core::{
    Collection, CollectionId, CollectionPage, CollectionStore, CoreResult, PaginationConfig,
    RepositoryId, SortKey, SortSpec, StoreQuery,
};

use super::{PageContext, PageOutcome, PaginationStrategy, Paginator};
use crate::error::CatalogResult;
use crate::fanout::FanOut;
use crate::metrics::SEEN_OVERFLOWS;
use crate::projector;
use crate::token::{CursorToken, PageToken, RepositoryCursor};

pub struct ScalablePaginator {
    store: Arc<dyn CollectionStore>,
    fanout: FanOut,
    pagination: PaginationConfig,
}

/// Merge state for one repository during a single call.
#[derive(Debug)]
struct Lane {
    repository_id: RepositoryId,
    /// Cursor the current batch was fetched from; committed when the batch is
    /// only partly consumed.
    start_cursor: Option<String>,
    next_cursor: Option<String>,
    fetched: bool,
    exhausted: bool,
    failed: bool,
    /// Failed calls before this one, from the token.
    failures: u32,
    buffer: VecDeque<Collection>,
    /// Sort key of the last emitted collection.
    after: Option<SortKey>,
    /// Ids emitted at exactly `after`, in emission order.
    tied: Vec<CollectionId>,
    tied_lookup: HashSet<CollectionId>,
    /// Every id in the current batch, visible or not.
    batch_ids: HashSet<CollectionId>,
    head_queued: bool,
}

impl Lane {
    fn resume(repository_id: RepositoryId, token: Option<&CursorToken>) -> Self {
        let position = token
            .and_then(|t| t.repository_cursors.get(&repository_id))
            .cloned()
            .unwrap_or_default();
        let tied: Vec<CollectionId> = token
            .and_then(|t| t.seen_collection_ids.get(&repository_id))
            .cloned()
            .unwrap_or_default();

        Self {
            tied_lookup: tied.iter().cloned().collect(),
            tied,
            repository_id,
            start_cursor: position.cursor,
            next_cursor: None,
            fetched: false,
            exhausted: position.exhausted,
            failed: false,
            failures: position.failures,
            buffer: VecDeque::new(),
            after: position.after,
            batch_ids: HashSet::new(),
            head_queued: false,
        }
    }

    fn needs_fetch(&self) -> bool {
        !self.head_queued
            && self.buffer.is_empty()
            && !self.exhausted
            && !self.failed
            && (!self.fetched || self.next_cursor.is_some())
    }

    fn fetch_cursor(&self) -> Option<String> {
        if self.fetched {
            self.next_cursor.clone()
        } else {
            self.start_cursor.clone()
        }
    }

    /// Whether an earlier page already returned `collection`.
    fn already_emitted(&self, collection: &Collection, sort: SortSpec) -> bool {
        let Some(after) = &self.after else {
            return false;
        };
        match sort.compare_key(collection, after) {
            Ordering::Less => true,
            Ordering::Equal => self.tied_lookup.contains(&collection.collection_id),
            Ordering::Greater => false,
        }
    }

    fn absorb(&mut self, fetched_from: Option<String>, page: CollectionPage, ctx: &PageContext<'_>) {
        if page.next_cursor.is_some() && page.next_cursor == fetched_from {
            warn!(
                repository_id = %self.repository_id,
                cursor = ?fetched_from,
                "Backing cursor did not advance, skipping repository for this request"
            );
            self.failed = true;
            return;
        }

        if self.fetched {
            self.start_cursor = fetched_from;
        }
        self.fetched = true;
        self.next_cursor = page.next_cursor;
        self.batch_ids = page.items.iter().map(|c| c.collection_id.clone()).collect();

        let buffer: VecDeque<Collection> =
            projector::filter_visible(page.items, ctx.caller, ctx.filter)
                .into_iter()
                .filter(|c| !self.already_emitted(c, ctx.sort))
                .collect();
        self.buffer = buffer;
    }

    fn record_emitted(&mut self, collection: &Collection, sort: SortSpec) {
        let key = sort.key(collection);
        if self.after.as_ref() != Some(&key) {
            self.after = Some(key);
            self.tied.clear();
            self.tied_lookup.clear();
        }
        if self.tied_lookup.insert(collection.collection_id.clone()) {
            self.tied.push(collection.collection_id.clone());
        }
    }

    /// Position to persist, and the ids to keep suppressing from there.
    fn commit(self, pagination: &PaginationConfig) -> (RepositoryCursor, Vec<CollectionId>) {
        let pending = self.head_queued || !self.buffer.is_empty();
        let done = RepositoryCursor {
            exhausted: true,
            ..RepositoryCursor::default()
        };

        if self.exhausted || (self.fetched && !pending && self.next_cursor.is_none()) {
            return (done, Vec::new());
        }

        let failures = if self.failed { self.failures.saturating_add(1) } else { 0 };
        if self.failed && failures >= pagination.max_partition_failures {
            warn!(
                repository_id = %self.repository_id,
                failures,
                "Repository failed on too many consecutive calls, giving up on it for this sequence"
            );
            return (done, Vec::new());
        }

        if !self.fetched {
            // Never read this call; resume from the same place next time.
            return (
                RepositoryCursor {
                    cursor: self.start_cursor,
                    exhausted: false,
                    after: self.after,
                    failures,
                },
                self.tied,
            );
        }

        if !pending {
            return (
                RepositoryCursor {
                    cursor: self.next_cursor,
                    exhausted: false,
                    after: None,
                    failures,
                },
                Vec::new(),
            );
        }

        let batch_ids = self.batch_ids;
        let tied: Vec<CollectionId> = self
            .tied
            .into_iter()
            .filter(|id| batch_ids.contains(id))
            .collect();

        if tied.len() <= pagination.max_seen_per_repository {
            return (
                RepositoryCursor {
                    cursor: self.start_cursor,
                    exhausted: false,
                    after: self.after,
                    failures,
                },
                tied,
            );
        }

        SEEN_OVERFLOWS
            .with_label_values(&[self.repository_id.as_str()])
            .inc();
        warn!(
            repository_id = %self.repository_id,
            seen = tied.len(),
            max_seen = pagination.max_seen_per_repository,
            "Seen-id window overflowed, skipping the rest of the current batch"
        );
        let exhausted = self.next_cursor.is_none();
        (
            RepositoryCursor {
                cursor: self.next_cursor,
                exhausted,
                after: None,
                failures,
            },
            Vec::new(),
        )
    }
}

/// Heap entry ordered so that `BinaryHeap` (a max-heap) pops the smallest
/// collection under the request's comparator.
struct HeapEntry {
    collection: Collection,
    lane: usize,
    sort: SortSpec,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort.compare(&other.collection, &self.collection)
    }
}

impl ScalablePaginator {
    pub fn new(store: Arc<dyn CollectionStore>, fanout: FanOut, pagination: PaginationConfig) -> Self {
        Self {
            store,
            fanout,
            pagination,
        }
    }

    /// Fetches batches until no lane is waiting on one.
    ///
    /// Each round is a barrier: all outstanding fetches settle before any
    /// result is merged into its lane.
    async fn refill(&self, lanes: &mut [Lane], ctx: &PageContext<'_>, batch_size: usize) {
        loop {
            let cursors: HashMap<RepositoryId, (usize, Option<String>)> = lanes
                .iter()
                .enumerate()
                .filter(|(_, lane)| lane.needs_fetch())
                .map(|(index, lane)| (lane.repository_id.clone(), (index, lane.fetch_cursor())))
                .collect();
            if cursors.is_empty() {
                return;
            }

            let ids: Vec<RepositoryId> = cursors.keys().cloned().collect();
            let results: Vec<(RepositoryId, CoreResult<CollectionPage>)> = self
                .fanout
                .run("query", ids, |repository_id| {
                    let query = StoreQuery {
                        status: ctx.status,
                        sort: ctx.sort,
                        cursor: cursors.get(&repository_id).and_then(|(_, c)| c.clone()),
                        limit: batch_size,
                    };
                    async move {
                        self.fanout
                            .with_retry("query", &repository_id, || {
                                self.store.query(&repository_id, &query)
                            })
                            .await
                    }
                })
                .await;

            for (repository_id, result) in results {
                let Some((index, fetched_from)) = cursors.get(&repository_id) else {
                    continue;
                };
                let lane = &mut lanes[*index];
                match result {
                    Ok(page) => lane.absorb(fetched_from.clone(), page, ctx),
                    Err(_) => lane.failed = true,
                }
            }
        }
    }
}

#[async_trait]
impl Paginator for ScalablePaginator {
    fn strategy(&self) -> PaginationStrategy {
        PaginationStrategy::Scalable
    }

    async fn fetch_page(
        &self,
        ctx: &PageContext<'_>,
        resume: Option<&PageToken>,
    ) -> CatalogResult<PageOutcome> {
        let token = match resume {
            Some(PageToken::Cursor(token)) => Some(token),
            _ => None,
        };
        let batch_size = self.pagination.batch_size(ctx.page_size);

        let mut lanes: Vec<Lane> = ctx
            .repositories
            .iter()
            .map(|r| Lane::resume(r.repository_id.clone(), token))
            .collect();

        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(lanes.len());
        let mut items: Vec<Collection> = Vec::with_capacity(ctx.page_size);

        loop {
            self.refill(&mut lanes, ctx, batch_size).await;
            for (index, lane) in lanes.iter_mut().enumerate() {
                if lane.head_queued {
                    continue;
                }
                if let Some(collection) = lane.buffer.pop_front() {
                    heap.push(HeapEntry {
                        collection,
                        lane: index,
                        sort: ctx.sort,
                    });
                    lane.head_queued = true;
                }
            }

            if items.len() >= ctx.page_size {
                break;
            }
            let Some(entry) = heap.pop() else {
                break;
            };
            let lane = &mut lanes[entry.lane];
            lane.head_queued = false;
            lane.record_emitted(&entry.collection, ctx.sort);
            items.push(entry.collection);
        }

        let failed = lanes.iter().filter(|l| l.failed).count();
        let mut repository_cursors = BTreeMap::new();
        let mut seen_collection_ids = BTreeMap::new();
        for lane in lanes {
            let repository_id = lane.repository_id.clone();
            let (position, seen) = lane.commit(&self.pagination);
            if !seen.is_empty() {
                seen_collection_ids.insert(repository_id.clone(), seen);
            }
            repository_cursors.insert(repository_id, position);
        }

        let next = if repository_cursors.values().all(|p| p.exhausted) {
            None
        } else {
            let global_offset = token.map_or(0, |t| t.global_offset) + items.len() as u64;
            Some(PageToken::Cursor(CursorToken {
                repository_cursors,
                seen_collection_ids,
                global_offset,
                fingerprint: ctx.fingerprint.to_string(),
            }))
        };

        debug!(
            repositories = ctx.repositories.len(),
            failed_repositories = failed,
            returned = items.len(),
            batch_size,
            terminal = next.is_none(),
            "Merged page assembled"
        );

        Ok(PageOutcome { items, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::CallerIdentity;
    use akidb_core::{CoreError, FilterSpec, Repository, RetryConfig, SortField, SortOrder};
    use akidb_storage::{MemoryCollectionStore, StoreOp};
    use std::time::Duration;

    fn paginator(store: &MemoryCollectionStore, pagination: PaginationConfig) -> ScalablePaginator {
        let retry = RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        };
        ScalablePaginator::new(
            Arc::new(store.clone()),
            FanOut::new(4, Duration::from_secs(1), retry),
            pagination,
        )
    }

    fn interleaved(repos: usize, per_repo: usize) -> (MemoryCollectionStore, Vec<Repository>) {
        let store = MemoryCollectionStore::new();
        let mut registered = Vec::new();
        for r in 0..repos {
            let repo = format!("repo-{r}");
            for i in 0..per_repo {
                // Names interleave across repositories: n-000-r0, n-000-r1, ...
                store.upsert(Collection::new(
                    repo.as_str(),
                    format!("c-{r}-{i:03}"),
                    format!("n-{i:03}-r{r}"),
                    "u1",
                ));
            }
            registered.push(Repository::new(repo.as_str(), repo.as_str()));
        }
        (store, registered)
    }

    async fn drain_all(
        paginator: &ScalablePaginator,
        ctx: &PageContext<'_>,
    ) -> (Vec<Collection>, Vec<usize>) {
        let mut all = Vec::new();
        let mut sizes = Vec::new();
        let mut token: Option<PageToken> = None;
        loop {
            let page = paginator.fetch_page(ctx, token.as_ref()).await.unwrap();
            sizes.push(page.items.len());
            all.extend(page.items);
            match page.next {
                Some(next) => token = Some(next),
                None => return (all, sizes),
            }
            assert!(sizes.len() < 1000, "pagination did not terminate");
        }
    }

    #[tokio::test]
    async fn test_full_sequence_is_ordered_and_complete() {
        let (store, repos) = interleaved(3, 7);
        let paginator = paginator(&store, PaginationConfig::default());
        let caller = CallerIdentity::new("u1", Vec::<String>::new(), false);
        let filter = FilterSpec::default();
        let sort = SortSpec::new(SortField::Name, SortOrder::Asc);
        let ctx = PageContext {
            caller: &caller,
            repositories: &repos,
            filter: &filter,
            sort,
            status: None,
            page_size: 4,
            fingerprint: "fp",
        };

        let (all, sizes) = drain_all(&paginator, &ctx).await;

        assert_eq!(all.len(), 21);
        assert!(all.windows(2).all(|w| sort.compare(&w[0], &w[1]) == Ordering::Less));
        assert_eq!(sizes, vec![4, 4, 4, 4, 4, 1]);
    }

    #[tokio::test]
    async fn test_token_tracks_cursor_and_seen_ids() {
        let (store, repos) = interleaved(1, 10);
        let paginator = paginator(&store, PaginationConfig::default());
        let caller = CallerIdentity::new("u1", Vec::<String>::new(), false);
        let filter = FilterSpec::default();
        let ctx = PageContext {
            caller: &caller,
            repositories: &repos,
            filter: &filter,
            sort: SortSpec::default(),
            status: None,
            page_size: 3,
            fingerprint: "fp",
        };

        let first = paginator.fetch_page(&ctx, None).await.unwrap();
        let Some(PageToken::Cursor(token)) = first.next else {
            panic!("expected a cursor token");
        };
        let repo = RepositoryId::new("repo-0");

        // Batch of 6 fetched from the start, 3 emitted out of it. Only the
        // last emitted key is kept, with the one id tied at it.
        let position = &token.repository_cursors[&repo];
        assert_eq!(position.cursor, None);
        assert!(!position.exhausted);
        assert_eq!(position.after, Some(SortKey::Name("n-002-r0".into())));
        assert_eq!(position.failures, 0);
        assert_eq!(token.seen_collection_ids[&repo], vec![CollectionId::new("c-0-002")]);
        assert_eq!(token.global_offset, 3);
        assert_eq!(token.fingerprint, "fp");
    }

    #[tokio::test]
    async fn test_hidden_batches_are_skipped() {
        let store = MemoryCollectionStore::new();
        for i in 0..12 {
            store.upsert(
                Collection::new("repo-0", format!("hidden-{i:02}"), format!("a-{i:02}"), "u2")
                    .with_private(true),
            );
        }
        store.upsert(Collection::new("repo-0", "visible", "z-last", "u1"));
        let repos = vec![Repository::new("repo-0", "Zero")];
        let paginator = paginator(&store, PaginationConfig::default());
        let caller = CallerIdentity::new("u1", Vec::<String>::new(), false);
        let filter = FilterSpec::default();
        let ctx = PageContext {
            caller: &caller,
            repositories: &repos,
            filter: &filter,
            sort: SortSpec::default(),
            status: None,
            page_size: 2,
            fingerprint: "fp",
        };

        let page = paginator.fetch_page(&ctx, None).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].collection_id.as_str(), "visible");
        assert!(page.next.is_none());
    }

    #[tokio::test]
    async fn test_token_holds_one_key_per_repository() {
        let (store, repos) = interleaved(8, 50);
        let paginator = paginator(&store, PaginationConfig::default());
        let caller = CallerIdentity::new("u1", Vec::<String>::new(), false);
        let filter = FilterSpec::default();
        let ctx = PageContext {
            caller: &caller,
            repositories: &repos,
            filter: &filter,
            sort: SortSpec::default(),
            status: None,
            page_size: 20,
            fingerprint: "fp",
        };

        let mut token: Option<PageToken> = None;
        for _ in 0..5 {
            let page = paginator.fetch_page(&ctx, token.as_ref()).await.unwrap();
            let Some(PageToken::Cursor(cursor)) = &page.next else {
                panic!("expected a cursor token");
            };
            assert!(cursor.seen_collection_ids.values().all(|ids| ids.len() <= 1));
            token = page.next;
        }
    }

    #[tokio::test]
    async fn test_failed_repository_keeps_its_position() {
        let (store, repos) = interleaved(2, 3);
        store.faults().fail_always(
            &RepositoryId::new("repo-1"),
            StoreOp::Query,
            CoreError::throttled("busy"),
        );
        let paginator = paginator(&store, PaginationConfig::default());
        let caller = CallerIdentity::new("u1", Vec::<String>::new(), false);
        let filter = FilterSpec::default();
        let ctx = PageContext {
            caller: &caller,
            repositories: &repos,
            filter: &filter,
            sort: SortSpec::default(),
            status: None,
            page_size: 10,
            fingerprint: "fp",
        };

        let page = paginator.fetch_page(&ctx, None).await.unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.items.iter().all(|c| c.repository_id.as_str() == "repo-0"));
        let Some(PageToken::Cursor(token)) = &page.next else {
            panic!("a failed repository must not end the sequence");
        };
        let position = &token.repository_cursors[&RepositoryId::new("repo-1")];
        assert!(!position.exhausted);
        assert_eq!(position.cursor, None);
        assert_eq!(position.failures, 1);

        // Given up after max_partition_failures consecutive failed calls.
        let (all, sizes) = drain_all(&paginator, &ctx).await;
        assert_eq!(all.len(), 3);
        assert_eq!(sizes, vec![3, 0, 0]);
    }

    #[tokio::test]
    async fn test_repository_recovers_after_transient_failure() {
        let (store, repos) = interleaved(2, 3);
        store.faults().fail_times(
            &RepositoryId::new("repo-1"),
            StoreOp::Query,
            1,
            CoreError::throttled("busy"),
        );
        let paginator = paginator(&store, PaginationConfig::default());
        let caller = CallerIdentity::new("u1", Vec::<String>::new(), false);
        let filter = FilterSpec::default();
        let ctx = PageContext {
            caller: &caller,
            repositories: &repos,
            filter: &filter,
            sort: SortSpec::default(),
            status: None,
            page_size: 10,
            fingerprint: "fp",
        };

        let (all, sizes) = drain_all(&paginator, &ctx).await;

        assert_eq!(sizes, vec![3, 3]);
        let ids: HashSet<&str> = all.iter().map(|c| c.collection_id.as_str()).collect();
        assert_eq!(ids.len(), 6);
    }

    #[tokio::test]
    async fn test_seen_overflow_forces_cursor_past_batch() {
        let store = MemoryCollectionStore::new();
        for i in 0..20 {
            store.upsert(Collection::new("repo-0", format!("c-{i:03}"), "same", "u1"));
        }
        let repos = vec![Repository::new("repo-0", "Zero")];
        let pagination = PaginationConfig {
            max_seen_per_repository: 2,
            ..PaginationConfig::default()
        };
        let paginator = paginator(&store, pagination);
        let caller = CallerIdentity::new("u1", Vec::<String>::new(), false);
        let filter = FilterSpec::default();
        let ctx = PageContext {
            caller: &caller,
            repositories: &repos,
            filter: &filter,
            sort: SortSpec::default(),
            status: None,
            page_size: 3,
            fingerprint: "fp",
        };
        let before = SEEN_OVERFLOWS.with_label_values(&["repo-0"]).get();

        // Three emitted ids tie on the name, one more than the cap.
        let first = paginator.fetch_page(&ctx, None).await.unwrap();
        let Some(PageToken::Cursor(token)) = first.next.clone() else {
            panic!("expected a cursor token");
        };
        let repo = RepositoryId::new("repo-0");
        assert_eq!(token.repository_cursors[&repo].cursor.as_deref(), Some("6"));
        assert_eq!(token.repository_cursors[&repo].after, None);
        assert!(token.seen_collection_ids.is_empty());
        assert_eq!(SEEN_OVERFLOWS.with_label_values(&["repo-0"]).get(), before + 1);

        let second = paginator.fetch_page(&ctx, first.next.as_ref()).await.unwrap();
        assert_eq!(second.items[0].collection_id.as_str(), "c-006");
    }

    #[tokio::test]
    async fn test_exhausted_repositories_are_not_queried_again() {
        let (store, repos) = interleaved(2, 2);
        let paginator = paginator(&store, PaginationConfig::default());
        let caller = CallerIdentity::new("u1", Vec::<String>::new(), false);
        let filter = FilterSpec::default();
        let ctx = PageContext {
            caller: &caller,
            repositories: &repos,
            filter: &filter,
            sort: SortSpec::new(SortField::Name, SortOrder::Desc),
            status: None,
            page_size: 2,
            fingerprint: "fp",
        };

        let first = paginator.fetch_page(&ctx, None).await.unwrap();
        let Some(PageToken::Cursor(token)) = first.next.clone() else {
            panic!("expected a cursor token");
        };
        assert_eq!(store.total_query_calls(), 2);
        assert!(token.repository_cursors.values().all(|c| !c.exhausted));

        let mut exhausted = token.clone();
        exhausted
            .repository_cursors
            .insert(
                RepositoryId::new("repo-1"),
                RepositoryCursor {
                    exhausted: true,
                    ..RepositoryCursor::default()
                },
            );
        let second = paginator
            .fetch_page(&ctx, Some(&PageToken::Cursor(exhausted)))
            .await
            .unwrap();

        assert_eq!(store.query_calls(&RepositoryId::new("repo-1")), 1);
        assert!(second.items.iter().all(|c| c.repository_id.as_str() == "repo-0"));
    }
}
