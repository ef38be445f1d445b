//! Filtering, ordering and display enrichment of aggregated results.

use serde::Serialize;
use std::collections::HashMap;

use akidb_core::{Collection, FilterSpec, Repository, RepositoryId, SortSpec};

use crate::access::CallerIdentity;

/// A collection as returned to callers, with its owning repository's display name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedCollection {
    #[serde(flatten)]
    pub collection: Collection,
    pub repository_name: String,
}

/// Keeps the collections the caller may see and the filter matches.
pub fn filter_visible(
    collections: Vec<Collection>,
    caller: &CallerIdentity,
    filter: &FilterSpec,
) -> Vec<Collection> {
    collections
        .into_iter()
        .filter(|c| caller.can_see_collection(c) && filter.matches(c))
        .collect()
}

/// Sorts in place by the shared comparator. The sort is stable.
pub fn sort_collections(collections: &mut [Collection], sort: SortSpec) {
    collections.sort_by(|a, b| sort.compare(a, b));
}

/// Attaches repository names.
///
/// A collection whose repository is no longer registered (deleted between the
/// estimate and the fetch) is labeled with its repository id instead.
pub fn enrich(collections: Vec<Collection>, repositories: &[Repository]) -> Vec<EnrichedCollection> {
    let names: HashMap<&RepositoryId, &str> = repositories
        .iter()
        .map(|r| (&r.repository_id, r.repository_name.as_str()))
        .collect();

    collections
        .into_iter()
        .map(|collection| {
            let repository_name = names
                .get(&collection.repository_id)
                .map_or_else(|| collection.repository_id.to_string(), |n| (*n).to_string());
            EnrichedCollection {
                collection,
                repository_name,
            }
        })
        .collect()
}
