use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::ids::RepositoryId;

/// Provisioning state of a repository, owned by the external lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryStatus {
    /// Backing infrastructure is being created.
    Provisioning,
    /// Repository is serving reads.
    Active,
    /// Repository is being torn down.
    Deleting,
    /// Provisioning or teardown failed.
    Failed,
}

impl RepositoryStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Active => "active",
            Self::Deleting => "deleting",
            Self::Failed => "failed",
        }
    }
}

impl Default for RepositoryStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl FromStr for RepositoryStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provisioning" => Ok(Self::Provisioning),
            "active" => Ok(Self::Active),
            "deleting" => Ok(Self::Deleting),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

/// A backing partition holding a subset of collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub repository_id: RepositoryId,
    /// Display name attached to listed collections.
    pub repository_name: String,
    /// Groups allowed to see the repository. Empty means public.
    #[serde(default)]
    pub allowed_groups: BTreeSet<String>,
    #[serde(default)]
    pub status: RepositoryStatus,
}

impl Repository {
    /// Creates a public, active repository.
    #[must_use]
    pub fn new(repository_id: impl Into<RepositoryId>, repository_name: impl Into<String>) -> Self {
        Self {
            repository_id: repository_id.into(),
            repository_name: repository_name.into(),
            allowed_groups: BTreeSet::new(),
            status: RepositoryStatus::Active,
        }
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
    pub fn with_status(mut self, status: RepositoryStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns `true` when the repository is serving reads.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RepositoryStatus::Active
    }
}
