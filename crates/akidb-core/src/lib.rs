//! Core domain types and traits for the AkiDB collection catalog.

pub mod collection;
pub mod config;
pub mod error;
pub mod ids;
pub mod query;
pub mod repository;
pub mod traits;

pub use collection::{Collection, CollectionMetadata, CollectionStatus};
pub use config::{CacheConfig, CatalogConfig, FanoutConfig, PaginationConfig, RetryConfig};
pub use error::{CoreError, CoreResult};
pub use ids::{CollectionId, RepositoryId};
pub use query::{CollectionPage, FilterSpec, SortField, SortKey, SortOrder, SortSpec, StoreQuery};
pub use repository::{Repository, RepositoryStatus};
pub use traits::{CollectionStore, RepositoryRegistry};
