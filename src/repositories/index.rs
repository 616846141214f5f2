use async_trait::async_trait;

use super::condition::{KeyCondition, SortKeyCondition};
use super::cursor::{Cursor, Page};
use super::schema::Entity;
use super::table::{EntityStream, EntityTable};
use crate::models::RepositoryResult;

/// Queries against an entity's global secondary indexes.
///
/// Index reads are eventually consistent: a write may not be visible to an
/// index query issued right after it.
#[async_trait]
pub trait IndexQuery<T: Entity>: Send + Sync {
    /// Equality on the index partition key only
    fn query_by_index(&self, index_name: &str, partition_key: &str) -> EntityStream<'_, T>;

    /// Equality on both the index partition key and the index sort key
    fn query_by_index_sort_key(
        &self,
        index_name: &str,
        partition_key: &str,
        sort_key: &str,
    ) -> EntityStream<'_, T>;

    fn query_by_index_with_condition(
        &self,
        index_name: &str,
        partition_key: &str,
        condition: SortKeyCondition,
    ) -> EntityStream<'_, T>;

    async fn query_by_index_paginated(
        &self,
        index_name: &str,
        partition_key: &str,
        condition: Option<SortKeyCondition>,
        page_size: u32,
        cursor: Option<Cursor>,
    ) -> RepositoryResult<Page<T>>;
}

#[async_trait]
impl<T: Entity> IndexQuery<T> for EntityTable<T> {
    fn query_by_index(&self, index_name: &str, partition_key: &str) -> EntityStream<'_, T> {
        self.stream_query(self.query_request(
            Some(index_name),
            KeyCondition::partition(partition_key),
            None,
        ))
    }

    fn query_by_index_sort_key(
        &self,
        index_name: &str,
        partition_key: &str,
        sort_key: &str,
    ) -> EntityStream<'_, T> {
        self.query_by_index_with_condition(
            index_name,
            partition_key,
            SortKeyCondition::Equal(sort_key.to_string()),
        )
    }

    fn query_by_index_with_condition(
        &self,
        index_name: &str,
        partition_key: &str,
        condition: SortKeyCondition,
    ) -> EntityStream<'_, T> {
        self.stream_query(self.query_request(
            Some(index_name),
            KeyCondition::partition(partition_key).with_sort(condition),
            None,
        ))
    }

    async fn query_by_index_paginated(
        &self,
        index_name: &str,
        partition_key: &str,
        condition: Option<SortKeyCondition>,
        page_size: u32,
        cursor: Option<Cursor>,
    ) -> RepositoryResult<Page<T>> {
        let mut key_condition = KeyCondition::partition(partition_key);
        key_condition.sort = condition;

        let request = self.query_request(Some(index_name), key_condition, None)?;
        self.query_page(request, page_size, cursor).await
    }
}
