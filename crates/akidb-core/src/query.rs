//! Sort, filter and backing-store query types shared by the storage layer and
//! the aggregation engine.
//!
//! The comparator defined here is the single source of ordering truth: backing
//! stores return each repository's run in [`SortSpec::compare`] order and the
//! engine merges runs with the same function, so per-repository and global
//! order never disagree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::collection::{Collection, CollectionStatus};
use crate::error::CoreError;

/// Field a listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortField {
    Name,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "NAME",
            Self::CreatedAt => "CREATED_AT",
            Self::UpdatedAt => "UPDATED_AT",
        }
    }
}

impl FromStr for SortField {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "").as_str() {
            "name" => Ok(Self::Name),
            "createdat" => Ok(Self::CreatedAt),
            "updatedat" => Ok(Self::UpdatedAt),
            _ => Err(CoreError::ValidationError(format!("unknown sort field `{s}`"))),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortOrder {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" => Ok(Self::Desc),
            _ => Err(CoreError::ValidationError(format!("unknown sort order `{s}`"))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested ordering of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

impl SortSpec {
    #[must_use]
    pub const fn new(field: SortField, order: SortOrder) -> Self {
        Self { field, order }
    }

    /// Parses a field/order pair from their string forms.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ValidationError` for an unknown field or order.
    pub fn parse(field: &str, order: &str) -> Result<Self, CoreError> {
        Ok(Self {
            field: field.parse()?,
            order: order.parse()?,
        })
    }

    /// Total order over collections.
    ///
    /// The sort field is compared in the requested direction (names
    /// case-sensitively, timestamps chronologically). Ties fall back to
    /// `collection_id` and then `repository_id`, both ascending, so two
    /// distinct collections never compare equal.
    #[must_use]
    pub fn compare(&self, a: &Collection, b: &Collection) -> Ordering {
        let primary = match self.field {
            SortField::Name => a.name.cmp(&b.name),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        };

        self.order
            .apply(primary)
            .then_with(|| a.collection_id.cmp(&b.collection_id))
            .then_with(|| a.repository_id.cmp(&b.repository_id))
    }

    /// The sort-field value of `collection`, without tie-breakers.
    #[must_use]
    pub fn key(&self, collection: &Collection) -> SortKey {
        match self.field {
            SortField::Name => SortKey::Name(collection.name.clone()),
            SortField::CreatedAt => SortKey::Timestamp(collection.created_at),
            SortField::UpdatedAt => SortKey::Timestamp(collection.updated_at),
        }
    }

    /// Where `collection` falls relative to `key` on the sort field alone, in
    /// the requested direction. A key of the other kind (name vs. timestamp)
    /// places every collection after it.
    #[must_use]
    pub fn compare_key(&self, collection: &Collection, key: &SortKey) -> Ordering {
        let primary = match (self.field, key) {
            (SortField::Name, SortKey::Name(name)) => collection.name.as_str().cmp(name.as_str()),
            (SortField::CreatedAt, SortKey::Timestamp(at)) => collection.created_at.cmp(at),
            (SortField::UpdatedAt, SortKey::Timestamp(at)) => collection.updated_at.cmp(at),
            _ => return Ordering::Greater,
        };
        self.order.apply(primary)
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::new(SortField::Name, SortOrder::Asc)
    }
}

/// A sort-field value, as carried in continuation tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    #[serde(rename = "n")]
    Name(String),
    #[serde(rename = "t")]
    Timestamp(DateTime<Utc>),
}

/// Optional case-insensitive substring filter over name and description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    needle: Option<String>,
}

impl FilterSpec {
    /// Builds a filter; empty text means "match everything".
    ///
    /// The text is lowercased but otherwise kept as given, whitespace
    /// included, so `" foo"` does not match `"afoo"`.
    #[must_use]
    pub fn new(text: Option<&str>) -> Self {
        let needle = text.filter(|t| !t.is_empty()).map(str::to_lowercase);
        Self { needle }
    }

    /// Normalized (lowercased) filter text, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.needle.as_deref()
    }

    #[must_use]
    pub fn matches(&self, collection: &Collection) -> bool {
        let Some(needle) = self.needle.as_deref() else {
            return true;
        };

        collection.name.to_lowercase().contains(needle)
            || collection
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(needle))
    }
}

/// One page request against a single repository's backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreQuery {
    pub status: Option<CollectionStatus>,
    pub sort: SortSpec,
    /// Opaque backing cursor returned by a previous page, `None` for the start.
    pub cursor: Option<String>,
    pub limit: usize,
}

/// One page of a repository's collections in `SortSpec::compare` order.
#[derive(Debug, Clone, Default)]
pub struct CollectionPage {
    pub items: Vec<Collection>,
    /// `None` once the repository has no further items.
    pub next_cursor: Option<String>,
}
