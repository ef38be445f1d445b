use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use akidb_core::{Collection, CollectionStore, CoreError, CoreResult, RepositoryId, StoreQuery};

use super::{PageContext, PageOutcome, PaginationStrategy, Paginator};
use crate::error::CatalogResult;
use crate::fanout::FanOut;
use crate::projector;
use crate::token::{OffsetToken, PageToken};

/// Bounded strategy: drain, filter, sort, slice.
///
/// Every call reads every accessible repository end to end, which is only
/// reasonable while the estimated corpus stays under the routing threshold.
/// Continuation tokens are v1 offsets into the globally sorted result.
pub struct SimplePaginator {
    store: Arc<dyn CollectionStore>,
    fanout: FanOut,
    drain_batch_size: usize,
}

impl SimplePaginator {
    pub fn new(store: Arc<dyn CollectionStore>, fanout: FanOut, drain_batch_size: usize) -> Self {
        Self {
            store,
            fanout,
            drain_batch_size: drain_batch_size.max(1),
        }
    }

    /// Reads a repository's whole run, following its cursors to the end.
    async fn drain(
        &self,
        repository_id: &RepositoryId,
        ctx: &PageContext<'_>,
    ) -> CoreResult<Vec<Collection>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let query = StoreQuery {
                status: ctx.status,
                sort: ctx.sort,
                cursor: cursor.clone(),
                limit: self.drain_batch_size,
            };
            let page = self
                .fanout
                .with_retry("query", repository_id, || {
                    self.store.query(repository_id, &query)
                })
                .await?;
            items.extend(page.items);

            match page.next_cursor {
                None => break,
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    return Err(CoreError::internal(format!(
                        "backing cursor `{next}` did not advance"
                    )));
                }
                Some(next) => cursor = Some(next),
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl Paginator for SimplePaginator {
    fn strategy(&self) -> PaginationStrategy {
        PaginationStrategy::Simple
    }

    async fn fetch_page(
        &self,
        ctx: &PageContext<'_>,
        resume: Option<&PageToken>,
    ) -> CatalogResult<PageOutcome> {
        let offset = match resume {
            Some(PageToken::Offset(token)) => token.offset,
            _ => 0,
        };

        let ids: Vec<RepositoryId> = ctx
            .repositories
            .iter()
            .map(|r| r.repository_id.clone())
            .collect();
        let drained = self
            .fanout
            .run("query", ids, |repository_id| async move {
                self.drain(&repository_id, ctx).await
            })
            .await;

        let drained: Vec<Collection> = drained
            .into_iter()
            .filter_map(|(_, result)| result.ok())
            .flatten()
            .collect();
        let mut visible = projector::filter_visible(drained, ctx.caller, ctx.filter);
        projector::sort_collections(&mut visible, ctx.sort);

        let total = visible.len();
        let start = offset.min(total);
        let end = start.saturating_add(ctx.page_size).min(total);
        let items: Vec<Collection> = visible.drain(start..end).collect();

        let next = (end < total).then(|| {
            PageToken::Offset(OffsetToken {
                offset: end,
                fingerprint: ctx.fingerprint.to_string(),
            })
        });

        debug!(
            offset = start,
            returned = items.len(),
            total_visible = total,
            terminal = next.is_none(),
            "Simple page assembled"
        );

        Ok(PageOutcome { items, next })
    }
}
