//! Entry point of the catalog listing engine.
//!
//! A call goes: validate → registered repositories → repository
//! access → fingerprint and token → strategy → page → token encode →
//! enrichment. Strategy choice follows the resumed token's version when there
//! is one, otherwise the estimated corpus size against
//! `pagination.simple_threshold`.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use akidb_core::{
    CatalogConfig, CollectionStatus, CollectionStore, FilterSpec, Repository, RepositoryRegistry,
    SortSpec,
};

use crate::access::CallerIdentity;
use crate::cache::CatalogCache;
use crate::error::{CatalogError, CatalogResult};
use crate::fanout::FanOut;
use crate::metrics::{LIST_DURATION, LIST_REQUESTS};
use crate::paginator::{
    PageContext, PaginationStrategy, Paginator, ScalablePaginator, SimplePaginator,
};
use crate::projector::{self, EnrichedCollection};
use crate::token::{self, PageToken, TokenCodec};

/// One `ListCollections` call.
#[derive(Debug, Clone)]
pub struct ListCollectionsRequest {
    pub caller: CallerIdentity,
    pub page_size: usize,
    /// Opaque token from a previous response.
    pub page_token: Option<String>,
    pub filter_text: Option<String>,
    pub sort: SortSpec,
    pub status: Option<CollectionStatus>,
}

impl ListCollectionsRequest {
    pub fn new(caller: CallerIdentity, page_size: usize) -> Self {
        Self {
            caller,
            page_size,
            page_token: None,
            filter_text: None,
            sort: SortSpec::default(),
            status: None,
        }
    }

    pub fn with_page_token(mut self, token: Option<String>) -> Self {
        self.page_token = token;
        self
    }

    pub fn with_filter(mut self, text: impl Into<String>) -> Self {
        self.filter_text = Some(text.into());
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_status(mut self, status: CollectionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Builds a request from the string-typed public API.
    ///
    /// Empty token and filter strings mean "none".
    ///
    /// # Errors
    ///
    /// `CatalogError::Validation` for a non-positive page size or an unknown
    /// sort field or order.
    #[allow(clippy::too_many_arguments)]
    pub fn from_raw(
        user: &str,
        user_groups: &[String],
        is_admin: bool,
        page_size: i64,
        page_token: Option<&str>,
        filter_text: Option<&str>,
        sort_field: &str,
        sort_order: &str,
    ) -> CatalogResult<Self> {
        let page_size = usize::try_from(page_size)
            .ok()
            .filter(|size| *size > 0)
            .ok_or_else(|| CatalogError::Validation(format!("page_size must be > 0, got {page_size}")))?;
        let sort = SortSpec::parse(sort_field, sort_order)?;

        Ok(Self {
            caller: CallerIdentity::new(user, user_groups.iter().cloned(), is_admin),
            page_size,
            page_token: page_token.filter(|t| !t.is_empty()).map(str::to_string),
            filter_text: filter_text.filter(|t| !t.is_empty()).map(str::to_string),
            sort,
            status: None,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ListCollectionsResponse {
    pub collections: Vec<EnrichedCollection>,
    /// Absent on the terminal page.
    pub next_page_token: Option<String>,
    /// Strategy that produced the page; absent when no repository was accessible.
    pub strategy: Option<PaginationStrategy>,
    /// Corpus estimate, present only when it was computed for routing.
    pub estimated_total: Option<u64>,
}

/// Cross-repository collection listing.
///
/// Construct once per process and share; every call is independent and
/// all resumption state travels in the page token.
pub struct CatalogAggregator {
    registry: Arc<dyn RepositoryRegistry>,
    store: Arc<dyn CollectionStore>,
    fanout: FanOut,
    simple: SimplePaginator,
    scalable: ScalablePaginator,
    codec: TokenCodec,
    cache: CatalogCache,
    config: CatalogConfig,
}

impl CatalogAggregator {
    pub fn new(
        registry: Arc<dyn RepositoryRegistry>,
        store: Arc<dyn CollectionStore>,
        config: CatalogConfig,
    ) -> Self {
        let fanout = FanOut::from_config(&config);
        let simple = SimplePaginator::new(
            store.clone(),
            fanout.clone(),
            config.pagination.drain_batch_size,
        );
        let scalable =
            ScalablePaginator::new(store.clone(), fanout.clone(), config.pagination.clone());

        Self {
            registry,
            store,
            fanout,
            simple,
            scalable,
            codec: TokenCodec::new(config.pagination.max_token_bytes),
            cache: CatalogCache::new(&config.cache),
            config,
        }
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Lists one page of the collections visible to the caller.
    ///
    /// Bounded by `request_timeout_ms` when configured; on expiry in-flight
    /// repository queries are dropped and no partial page is returned.
    pub async fn list(
        &self,
        request: ListCollectionsRequest,
    ) -> CatalogResult<ListCollectionsResponse> {
        let started = Instant::now();

        let result = match self.config.request_timeout() {
            Some(deadline) => tokio::time::timeout(deadline, self.list_inner(&request))
                .await
                .unwrap_or(Err(CatalogError::DeadlineExceeded(deadline))),
            None => self.list_inner(&request).await,
        };

        let strategy = result
            .as_ref()
            .ok()
            .and_then(|r| r.strategy)
            .map_or("none", |s| s.as_str());
        LIST_REQUESTS
            .with_label_values(&[strategy, outcome_label(&result)])
            .inc();
        LIST_DURATION
            .with_label_values(&[strategy])
            .observe(started.elapsed().as_secs_f64());

        result
    }

    /// Like [`list`](Self::list), aborted as soon as `cancel` completes.
    pub async fn list_with_cancel<C>(
        &self,
        request: ListCollectionsRequest,
        cancel: C,
    ) -> CatalogResult<ListCollectionsResponse>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                debug!(user = %request.caller.user, "List request cancelled by caller");
                LIST_REQUESTS.with_label_values(&["none", "cancelled"]).inc();
                Err(CatalogError::Cancelled)
            }
            result = self.list(request.clone()) => result,
        }
    }

    async fn list_inner(
        &self,
        request: &ListCollectionsRequest,
    ) -> CatalogResult<ListCollectionsResponse> {
        self.validate(request)?;

        let registered = self.registered_repositories().await?;
        let accessible: Vec<Repository> = registered
            .iter()
            .filter(|r| r.is_active() && request.caller.can_see_repository(r))
            .cloned()
            .collect();

        if accessible.is_empty() {
            debug!(
                user = %request.caller.user,
                registered = registered.len(),
                "No accessible repositories"
            );
            return Ok(ListCollectionsResponse::default());
        }

        let filter = FilterSpec::new(request.filter_text.as_deref());
        let fingerprint = token::fingerprint(&filter, request.sort, request.status);
        let resume = self
            .codec
            .resume(request.page_token.as_deref(), &fingerprint);

        let (paginator, estimated_total): (&dyn Paginator, Option<u64>) = match &resume {
            Some(PageToken::Offset(_)) => (&self.simple, None),
            Some(PageToken::Cursor(_)) => (&self.scalable, None),
            None => {
                let estimate = self.estimate(&accessible, request.status).await;
                if estimate < self.config.pagination.simple_threshold {
                    (&self.simple, Some(estimate))
                } else {
                    (&self.scalable, Some(estimate))
                }
            }
        };

        debug!(
            strategy = %paginator.strategy(),
            repositories = accessible.len(),
            estimated_total = ?estimated_total,
            resumed = resume.is_some(),
            page_size = request.page_size,
            "Selected pagination strategy"
        );

        let ctx = PageContext {
            caller: &request.caller,
            repositories: &accessible,
            filter: &filter,
            sort: request.sort,
            status: request.status,
            page_size: request.page_size,
            fingerprint: &fingerprint,
        };
        let outcome = paginator.fetch_page(&ctx, resume.as_ref()).await?;

        let next_page_token = outcome
            .next
            .as_ref()
            .map(|t| self.codec.encode(t))
            .transpose()?;

        Ok(ListCollectionsResponse {
            collections: projector::enrich(outcome.items, &registered),
            next_page_token,
            strategy: Some(paginator.strategy()),
            estimated_total,
        })
    }

    fn validate(&self, request: &ListCollectionsRequest) -> CatalogResult<()> {
        if request.page_size == 0 {
            return Err(CatalogError::Validation(
                "page_size must be > 0".to_string(),
            ));
        }
        let max = self.config.pagination.max_page_size;
        if request.page_size > max {
            return Err(CatalogError::Validation(format!(
                "page_size must be <= {max}, got {}",
                request.page_size
            )));
        }
        Ok(())
    }

    /// Read on every call: repository access rules take effect immediately
    /// and a registry outage is never masked.
    async fn registered_repositories(&self) -> CatalogResult<Vec<Repository>> {
        self.registry.list_registered().await.map_err(|e| {
            error!(error = %e, "Repository registry unavailable");
            CatalogError::RegistryUnavailable(e)
        })
    }

    /// Best-effort corpus size. A repository whose count fails counts as 0.
    async fn estimate(&self, repositories: &[Repository], status: Option<CollectionStatus>) -> u64 {
        let mut total: u64 = 0;
        let mut uncached = Vec::new();
        for repository in repositories {
            match self.cache.get_count(&repository.repository_id, status).await {
                Some(count) => total = total.saturating_add(count),
                None => uncached.push(repository.repository_id.clone()),
            }
        }

        let counted = self
            .fanout
            .run("count", uncached, |repository_id| async move {
                self.fanout
                    .with_retry("count", &repository_id, || {
                        self.store.count(&repository_id, status)
                    })
                    .await
            })
            .await;

        for (repository_id, result) in counted {
            if let Ok(count) = result {
                total = total.saturating_add(count);
                self.cache.put_count(repository_id, status, count).await;
            }
        }

        info!(repositories = repositories.len(), estimate = total, "Estimated corpus size");
        total
    }
}

fn outcome_label(result: &CatalogResult<ListCollectionsResponse>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(CatalogError::Validation(_)) => "invalid",
        Err(CatalogError::RegistryUnavailable(_)) => "registry_unavailable",
        Err(CatalogError::Cancelled) => "cancelled",
        Err(CatalogError::DeadlineExceeded(_)) => "deadline_exceeded",
        Err(CatalogError::Internal(_)) => "internal",
    }
}
