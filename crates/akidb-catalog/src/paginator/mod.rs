//! Pagination strategies.
//!
//! Two unrelated algorithms sit behind one [`Paginator`] interface and share
//! no state:
//!
//! - [`SimplePaginator`]: drains every accessible repository, then sorts and
//!   slices by offset. Exact, but O(corpus) per call.
//! - [`ScalablePaginator`]: keeps one cursor per repository in the token and
//!   k-way merges sorted per-repository batches.
//!
//! The aggregator picks one per call.

mod scalable;
mod simple;

pub use scalable::ScalablePaginator;
pub use simple::SimplePaginator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use akidb_core::{Collection, CollectionStatus, FilterSpec, Repository, SortSpec};

use crate::access::CallerIdentity;
use crate::error::CatalogResult;
use crate::token::PageToken;

/// Which strategy produced a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationStrategy {
    Simple,
    Scalable,
}

impl PaginationStrategy {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Scalable => "scalable",
        }
    }
}

impl fmt::Display for PaginationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a strategy needs to produce one page.
#[derive(Debug)]
pub struct PageContext<'a> {
    pub caller: &'a CallerIdentity,
    /// Registered, active repositories the caller may see.
    pub repositories: &'a [Repository],
    pub filter: &'a FilterSpec,
    pub sort: SortSpec,
    pub status: Option<CollectionStatus>,
    pub page_size: usize,
    /// Fingerprint stamped on the emitted continuation token.
    pub fingerprint: &'a str,
}

/// One page and the state needed to continue, `None` on the terminal page.
#[derive(Debug, Default)]
pub struct PageOutcome {
    pub items: Vec<Collection>,
    pub next: Option<PageToken>,
}

#[async_trait]
pub trait Paginator: Send + Sync {
    fn strategy(&self) -> PaginationStrategy;

    /// Produces the next page.
    ///
    /// `resume` has already been decoded and checked against the request
    /// fingerprint. A token of the other strategy's version is ignored.
    /// Repository failures shrink the page's inputs; they are never returned.
    async fn fetch_page(
        &self,
        ctx: &PageContext<'_>,
        resume: Option<&PageToken>,
    ) -> CatalogResult<PageOutcome>;
}
