use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use featureflag_rs::models::{validate_name, FeatureFlag, MAX_NAME_LENGTH};
use featureflag_rs::repositories::{
    EntityTable, InMemoryStore, IndexQuery, TableNames, TableStore, USER_INDEX,
};
use futures_util::TryStreamExt;
use proptest::prelude::*;
use tokio::runtime::Runtime;

prop_compose! {
    fn arb_feature_flag()(
        env_name in prop_oneof![Just("prod"), Just("staging"), Just("dev")],
        feature_name in "[a-z][a-z0-9-]{0,11}",
        flag_type in prop_oneof![Just("BOOLEAN"), Just("STRING"), Just("NUMBER")],
        config in prop::option::of("[a-zA-Z0-9]{0,16}"),
        user_id in prop_oneof![Just("u1"), Just("u2"), Just("u3")],
    ) -> FeatureFlag {
        let flag = FeatureFlag::new(env_name, feature_name, flag_type, user_id);
        match config {
            Some(config) => flag.with_config(format!("\"{}\"", config)),
            None => flag,
        }
    }
}

fn runtime() -> Runtime {
    Runtime::new().expect("Failed to create runtime")
}

/// A table whose store answers at most `page_items` items per round trip
fn flag_table(page_items: usize) -> (Arc<InMemoryStore>, EntityTable<FeatureFlag>) {
    let store = Arc::new(
        InMemoryStore::with_tables(&TableNames::default()).with_max_page_items(page_items),
    );
    let shared: Arc<dyn TableStore> = store.clone();
    (store, EntityTable::new(shared))
}

/// Last write wins per primary key
fn latest_by_key(flags: &[FeatureFlag]) -> BTreeMap<(String, String), FeatureFlag> {
    flags
        .iter()
        .map(|flag| {
            (
                (flag.env_name.clone(), flag.feature_name.clone()),
                flag.clone(),
            )
        })
        .collect()
}

fn keys(flags: &[FeatureFlag]) -> BTreeSet<(String, String)> {
    flags
        .iter()
        .map(|flag| (flag.env_name.clone(), flag.feature_name.clone()))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_get_returns_what_was_saved(flag in arb_feature_flag()) {
        let (_, table) = flag_table(10);
        let fetched = runtime().block_on(async {
            table.save(flag.clone()).await.unwrap();
            table.get_item(&flag).await.unwrap()
        });

        prop_assert_eq!(fetched, Some(flag));
    }

    #[test]
    fn test_save_is_idempotent(flag in arb_feature_flag()) {
        let (store, table) = flag_table(10);
        let (count, fetched) = runtime().block_on(async {
            table.save(flag.clone()).await.unwrap();
            table.save(flag.clone()).await.unwrap();
            (
                store.item_count("FeatureFlag").await,
                table.get(&flag.env_name, Some(flag.feature_name.as_str())).await.unwrap(),
            )
        });

        prop_assert_eq!(count, 1);
        prop_assert_eq!(fetched, Some(flag));
    }

    #[test]
    fn test_delete_then_get_is_absent(flag in arb_feature_flag(), saved in any::<bool>()) {
        let (_, table) = flag_table(10);
        let fetched = runtime().block_on(async {
            if saved {
                table.save(flag.clone()).await.unwrap();
            }
            table.delete_item(&flag).await.unwrap();
            table.get_item(&flag).await.unwrap()
        });

        prop_assert_eq!(fetched, None);
    }

    #[test]
    fn test_partition_query_is_exact(
        flags in prop::collection::vec(arb_feature_flag(), 0..24),
        page_items in 1usize..5,
    ) {
        let (_, table) = flag_table(page_items);
        let expected = latest_by_key(&flags);

        let found = runtime().block_on(async {
            for flag in &flags {
                table.save(flag.clone()).await.unwrap();
            }
            let found: Vec<FeatureFlag> = table
                .query_by_partition_key("prod")
                .try_collect()
                .await
                .unwrap();
            found
        });

        let expected_prod: Vec<FeatureFlag> = expected
            .into_iter()
            .filter(|((env_name, _), _)| env_name == "prod")
            .map(|(_, flag)| flag)
            .collect();

        // BTreeMap order is feature-name order, which is the sort-key order
        prop_assert_eq!(found, expected_prod);
    }

    #[test]
    fn test_pages_concatenate_to_partition_query(
        flags in prop::collection::vec(arb_feature_flag(), 0..24),
        page_size in 1u32..6,
        page_items in 1usize..5,
    ) {
        let (_, table) = flag_table(page_items);

        let (paged, full) = runtime().block_on(async {
            for flag in &flags {
                table.save(flag.clone()).await.unwrap();
            }

            let mut paged = Vec::new();
            let mut cursor = None;
            loop {
                let page = table
                    .query_by_partition_key_paginated("staging", page_size, cursor)
                    .await
                    .unwrap();
                assert!(page.items.len() <= page_size as usize);
                paged.extend(page.items);
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }

            let full: Vec<FeatureFlag> = table
                .query_by_partition_key("staging")
                .try_collect()
                .await
                .unwrap();
            (paged, full)
        });

        prop_assert_eq!(paged, full);
    }

    #[test]
    fn test_index_query_matches_filtered_scan(
        flags in prop::collection::vec(arb_feature_flag(), 0..24),
        page_items in 1usize..5,
    ) {
        let (_, table) = flag_table(page_items);

        let (indexed, scanned, owned_in_prod) = runtime().block_on(async {
            for flag in &flags {
                table.save(flag.clone()).await.unwrap();
            }

            let indexed: Vec<FeatureFlag> = table
                .query_by_index(USER_INDEX, "u1")
                .try_collect()
                .await
                .unwrap();
            let scanned: Vec<FeatureFlag> = table.scan_all().try_collect().await.unwrap();
            let owned_in_prod: Vec<FeatureFlag> = table
                .query_by_index_sort_key(USER_INDEX, "u1", "prod")
                .try_collect()
                .await
                .unwrap();
            (indexed, scanned, owned_in_prod)
        });

        let scanned_for_user: Vec<FeatureFlag> = scanned
            .into_iter()
            .filter(|flag| flag.user_id == "u1")
            .collect();

        prop_assert_eq!(keys(&indexed), keys(&scanned_for_user));
        prop_assert_eq!(indexed.len(), scanned_for_user.len());
        prop_assert!(owned_in_prod.iter().all(|flag| flag.env_name == "prod" && flag.user_id == "u1"));
        prop_assert_eq!(
            keys(&owned_in_prod),
            keys(&indexed).into_iter().filter(|(env_name, _)| env_name == "prod").collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn test_name_validation(name in ".*") {
        let result = validate_name("name", &name);
        let trimmed = name.trim();

        if !trimmed.is_empty()
            && trimmed.len() <= MAX_NAME_LENGTH
            && !trimmed.chars().any(|c| c.is_control())
        {
            prop_assert!(result.is_ok());
        } else {
            prop_assert!(result.is_err());
        }
    }
}
