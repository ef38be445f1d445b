//! Repository- and collection-level visibility rules.
//!
//! Both checks are pure. Every collection leaving a paginator must pass
//! [`has_collection_access`] in addition to its repository passing
//! [`has_repository_access`]: a visible repository may still hold collections
//! with stricter rules.

use std::collections::BTreeSet;

use akidb_core::{Collection, Repository};

/// Identity of the caller, as resolved by the authentication layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user: String,
    pub groups: BTreeSet<String>,
    pub is_admin: bool,
}

impl CallerIdentity {
    pub fn new<I, S>(user: impl Into<String>, groups: I, is_admin: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user: user.into(),
            groups: groups.into_iter().map(Into::into).collect(),
            is_admin,
        }
    }

    #[must_use]
    pub fn can_see_repository(&self, repository: &Repository) -> bool {
        has_repository_access(&self.groups, repository, self.is_admin)
    }

    #[must_use]
    pub fn can_see_collection(&self, collection: &Collection) -> bool {
        has_collection_access(&self.user, &self.groups, self.is_admin, collection)
    }
}

/// Admins see everything; otherwise an empty group set means public.
#[must_use]
pub fn has_repository_access(
    user_groups: &BTreeSet<String>,
    repository: &Repository,
    is_admin: bool,
) -> bool {
    is_admin
        || repository.allowed_groups.is_empty()
        || !user_groups.is_disjoint(&repository.allowed_groups)
}

/// Private collections are visible to their owner only; `allowed_groups`
/// is never consulted for them.
#[must_use]
pub fn has_collection_access(
    user: &str,
    user_groups: &BTreeSet<String>,
    is_admin: bool,
    collection: &Collection,
) -> bool {
    if is_admin {
        return true;
    }
    if collection.private {
        return collection.created_by == user;
    }
    collection.allowed_groups.is_empty() || !user_groups.is_disjoint(&collection.allowed_groups)
}
