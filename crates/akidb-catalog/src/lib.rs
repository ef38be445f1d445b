//! Cross-repository aggregation and pagination for the AkiDB collection catalog.
//!
//! Callers see one filtered, sorted, access-controlled list of collections
//! even though the collections live in many independently paginated
//! repositories. [`CatalogAggregator`] is the entry point.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use akidb_catalog::{CallerIdentity, CatalogAggregator, ListCollectionsRequest};
//! use akidb_core::{CatalogConfig, CollectionStore, RepositoryRegistry};
//!
//! # async fn run(
//! #     registry: Arc<dyn RepositoryRegistry>,
//! #     store: Arc<dyn CollectionStore>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let aggregator = CatalogAggregator::new(registry, store, CatalogConfig::load()?);
//! let caller = CallerIdentity::new("u1", ["g1"], false);
//!
//! let mut token = None;
//! loop {
//!     let request = ListCollectionsRequest::new(caller.clone(), 50).with_page_token(token);
//!     let page = aggregator.list(request).await?;
//!     for item in &page.collections {
//!         println!("{} ({})", item.collection.name, item.repository_name);
//!     }
//!     match page.next_page_token {
//!         Some(next) => token = Some(next),
//!         None => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod aggregator;
pub mod cache;
pub mod error;
pub mod fanout;
pub mod metrics;
pub mod paginator;
pub mod projector;
pub mod telemetry;
pub mod token;

pub use access::{has_collection_access, has_repository_access, CallerIdentity};
pub use aggregator::{CatalogAggregator, ListCollectionsRequest, ListCollectionsResponse};
pub use cache::CatalogCache;
pub use error::{CatalogError, CatalogResult};
pub use fanout::FanOut;
pub use paginator::{
    PageContext, PageOutcome, PaginationStrategy, Paginator, ScalablePaginator, SimplePaginator,
};
pub use projector::EnrichedCollection;
pub use token::{CursorToken, OffsetToken, PageToken, RepositoryCursor, TokenCodec};
