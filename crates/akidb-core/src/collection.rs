use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::ids::{CollectionId, RepositoryId};

/// Lifecycle status of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CollectionStatus {
    /// Collection is live and queryable.
    Active,
    /// Collection is retained read-only.
    Archived,
    /// Collection is soft-deleted and pending purge.
    Deleted,
}

impl CollectionStatus {
    /// Returns the canonical uppercase string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Archived => "ARCHIVED",
            Self::Deleted => "DELETED",
        }
    }
}

impl Default for CollectionStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl FromStr for CollectionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "ARCHIVED" => Ok(Self::Archived),
            "DELETED" => Ok(Self::Deleted),
            _ => Err(()),
        }
    }
}

/// Free-form collection metadata: tags plus custom fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub custom: BTreeMap<String, Value>,
}

/// A logical grouping of indexed documents owned by exactly one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Identifier, unique within the owning repository.
    pub collection_id: CollectionId,
    /// Owning repository (partition).
    pub repository_id: RepositoryId,
    /// Human-readable name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Owner identity.
    pub created_by: String,
    /// Creation timestamp in UTC.
    pub created_at: DateTime<Utc>,
    /// Update timestamp in UTC.
    pub updated_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: CollectionStatus,
    /// When set, only `created_by` (or an admin) may see the collection.
    #[serde(default)]
    pub private: bool,
    /// Groups allowed to see the collection. Empty inherits repository visibility.
    #[serde(default)]
    pub allowed_groups: BTreeSet<String>,
    #[serde(default)]
    pub metadata: CollectionMetadata,
}

impl Collection {
    /// Creates an active, non-private collection with no group restrictions.
    #[must_use]
    pub fn new(
        repository_id: impl Into<RepositoryId>,
        collection_id: impl Into<CollectionId>,
        name: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            collection_id: collection_id.into(),
            repository_id: repository_id.into(),
            name: name.into(),
            description: None,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
            status: CollectionStatus::Active,
            private: false,
            allowed_groups: BTreeSet::new(),
            metadata: CollectionMetadata::default(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    #[must_use]
    pub fn with_allowed_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: CollectionStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_timestamps(mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }

    /// Updates the `updated_at` timestamp to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
