// Property-based tests for cross-repository pagination
//
// Random corpora (repositories, visibility rules, colliding names and
// timestamps) are paginated to the end with both strategies.
//
// Properties tested:
// 1. Both strategies yield exactly the visible corpus in comparator order
// 2. Non-terminal pages are full; the terminal page is not over-full
// 3. No collection appears twice in a sequence

mod common;

use akidb_catalog::{has_collection_access, has_repository_access, CallerIdentity};
use akidb_core::{Collection, Repository, SortField, SortOrder, SortSpec};
use common::*;
use proptest::prelude::*;

const GROUPS: [&str; 3] = ["g1", "g2", "g3"];
const USERS: [&str; 3] = ["u1", "u2", "u3"];

#[derive(Debug, Clone)]
struct CollectionSeed {
    name: u8,
    minute: u8,
    owner: usize,
    private: bool,
    groups: Vec<usize>,
}

#[derive(Debug, Clone)]
struct RepositorySeed {
    groups: Vec<usize>,
    collections: Vec<CollectionSeed>,
}

fn group_set() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..GROUPS.len(), 0..=2)
}

fn collection_seed() -> impl Strategy<Value = CollectionSeed> {
    (0u8..12, 0u8..20, 0..USERS.len(), prop::bool::weighted(0.2), group_set()).prop_map(
        |(name, minute, owner, private, groups)| CollectionSeed {
            name,
            minute,
            owner,
            private,
            groups,
        },
    )
}

fn corpus() -> impl Strategy<Value = Vec<RepositorySeed>> {
    prop::collection::vec(
        (group_set(), prop::collection::vec(collection_seed(), 0..25))
            .prop_map(|(groups, collections)| RepositorySeed { groups, collections }),
        1..5,
    )
}

fn sort_spec() -> impl Strategy<Value = SortSpec> {
    (
        prop_oneof![
            Just(SortField::Name),
            Just(SortField::CreatedAt),
            Just(SortField::UpdatedAt)
        ],
        prop_oneof![Just(SortOrder::Asc), Just(SortOrder::Desc)],
    )
        .prop_map(|(field, order)| SortSpec::new(field, order))
}

fn build(seeds: &[RepositorySeed]) -> (Fixture, Vec<Repository>, Vec<Collection>) {
    let repositories: Vec<Repository> = seeds
        .iter()
        .enumerate()
        .map(|(r, seed)| {
            Repository::new(format!("repo-{r}"), format!("Repository {r}"))
                .with_allowed_groups(seed.groups.iter().map(|g| GROUPS[*g]))
        })
        .collect();
    let fixture = Fixture::new(repositories.clone());

    let mut collections = Vec::new();
    for (r, seed) in seeds.iter().enumerate() {
        for (i, c) in seed.collections.iter().enumerate() {
            let collection = Collection::new(
                format!("repo-{r}"),
                format!("c-{i:02}"),
                format!("name-{:02}", c.name),
                USERS[c.owner],
            )
            .with_private(c.private)
            .with_allowed_groups(c.groups.iter().map(|g| GROUPS[*g]))
            .with_timestamps(at(i64::from(c.minute)), at(i64::from(c.minute / 2)));
            fixture.store.upsert(collection.clone());
            collections.push(collection);
        }
    }

    (fixture, repositories, collections)
}

fn expected_view(
    caller: &CallerIdentity,
    repositories: &[Repository],
    collections: &[Collection],
    sort: SortSpec,
) -> Vec<(String, String)> {
    let mut visible: Vec<&Collection> = collections
        .iter()
        .filter(|c| {
            repositories
                .iter()
                .find(|r| r.repository_id == c.repository_id)
                .is_some_and(|r| has_repository_access(&caller.groups, r, caller.is_admin))
        })
        .filter(|c| has_collection_access(&caller.user, &caller.groups, caller.is_admin, c))
        .collect();
    visible.sort_by(|a, b| sort.compare(a, b));
    visible
        .into_iter()
        .map(|c| (c.repository_id.to_string(), c.collection_id.to_string()))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_strategies_return_the_visible_corpus_in_order(
        seeds in corpus(),
        sort in sort_spec(),
        page_size in 1usize..8,
        user in 0..USERS.len(),
        groups in group_set(),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let result: Result<(), TestCaseError> = runtime.block_on(async {
            let (fixture, repositories, collections) = build(&seeds);
            let caller = CallerIdentity::new(USERS[user], groups.iter().map(|g| GROUPS[*g]), false);
            let expected = expected_view(&caller, &repositories, &collections, sort);

            for threshold in [FORCE_SIMPLE, FORCE_SCALABLE] {
                let aggregator = fixture.aggregator(test_config(threshold));
                let sequence = paginate(&aggregator, &caller, page_size, None, sort).await;

                prop_assert_eq!(&sequence.ids(), &expected);

                let (last, full) = sequence.page_sizes.split_last().unwrap();
                prop_assert!(full.iter().all(|n| *n == page_size));
                prop_assert!(*last <= page_size);
            }
            Ok(())
        });
        result?;
    }

    #[test]
    fn prop_admin_sees_everything_exactly_once(
        seeds in corpus(),
        sort in sort_spec(),
        page_size in 1usize..6,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let result: Result<(), TestCaseError> = runtime.block_on(async {
            let (fixture, _, collections) = build(&seeds);
            let admin = CallerIdentity::new("root", Vec::<String>::new(), true);
            let aggregator = fixture.aggregator(test_config(FORCE_SCALABLE));

            let sequence = paginate(&aggregator, &admin, page_size, None, sort).await;

            prop_assert_eq!(sequence.items.len(), collections.len());
            let mut ids = sequence.ids();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), collections.len());
            Ok(())
        });
        result?;
    }
}
