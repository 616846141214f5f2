use async_trait::async_trait;
use futures_util::TryStreamExt;
use std::sync::Arc;
use tracing::{info, instrument};

use super::condition::SortKeyCondition;
use super::cursor::{Cursor, Page};
use super::index::IndexQuery;
use super::schema::{Entity, IndexSchema, KeySchema, TableSchema};
use super::store::TableStore;
use super::table::EntityTable;
use crate::models::{FeatureFlag, RepositoryResult};

/// Index over flag owners, sorted by environment
pub const USER_INDEX: &str = "FFUserId";

pub const FEATURE_FLAG_TABLE: TableSchema = TableSchema {
    table_name: "FeatureFlag",
    key: KeySchema::composite("EnvName", "FeatureName"),
    indexes: &[IndexSchema {
        name: USER_INDEX,
        key: KeySchema::composite("userId", "EnvName"),
    }],
};

impl Entity for FeatureFlag {
    const ENTITY_TYPE: &'static str = "FeatureFlag";
    const SCHEMA: TableSchema = FEATURE_FLAG_TABLE;

    fn partition_key(&self) -> &str {
        &self.env_name
    }

    fn sort_key(&self) -> Option<&str> {
        Some(&self.feature_name)
    }
}

/// Trait defining the interface for feature flag data access operations
#[async_trait]
pub trait FeatureFlagRepository: Send + Sync {
    async fn save(&self, flag: FeatureFlag) -> RepositoryResult<FeatureFlag>;

    async fn get_by_name(
        &self,
        env_name: &str,
        feature_name: &str,
    ) -> RepositoryResult<Option<FeatureFlag>>;

    /// All flags of an environment, by feature name
    async fn list_by_environment(&self, env_name: &str) -> RepositoryResult<Vec<FeatureFlag>>;

    async fn list_by_environment_page(
        &self,
        env_name: &str,
        page_size: u32,
        cursor: Option<Cursor>,
    ) -> RepositoryResult<Page<FeatureFlag>>;

    /// Flags of an environment owned by `user_id`, read from the user index
    async fn list_by_environment_for_user(
        &self,
        env_name: &str,
        user_id: &str,
    ) -> RepositoryResult<Vec<FeatureFlag>>;

    async fn list_by_environment_for_user_page(
        &self,
        env_name: &str,
        user_id: &str,
        page_size: u32,
        cursor: Option<Cursor>,
    ) -> RepositoryResult<Page<FeatureFlag>>;

    /// Every flag owned by `user_id` across environments
    async fn list_for_user(&self, user_id: &str) -> RepositoryResult<Vec<FeatureFlag>>;

    async fn delete(&self, env_name: &str, feature_name: &str) -> RepositoryResult<()>;
}

/// [`FeatureFlagRepository`] over any [`TableStore`]
pub struct TableFeatureFlagRepository {
    table: EntityTable<FeatureFlag>,
}

impl TableFeatureFlagRepository {
    pub fn new(store: Arc<dyn TableStore>, table_name: impl Into<String>) -> Self {
        Self {
            table: EntityTable::with_table_name(store, table_name),
        }
    }

    pub fn table_name(&self) -> &str {
        self.table.table_name()
    }
}

#[async_trait]
impl FeatureFlagRepository for TableFeatureFlagRepository {
    #[instrument(skip(self, flag), fields(table = %self.table.table_name(), env_name = %flag.env_name, feature_name = %flag.feature_name))]
    async fn save(&self, flag: FeatureFlag) -> RepositoryResult<FeatureFlag> {
        info!("Saving feature flag");
        self.table.save(flag).await
    }

    #[instrument(skip(self), fields(table = %self.table.table_name(), env_name = %env_name, feature_name = %feature_name))]
    async fn get_by_name(
        &self,
        env_name: &str,
        feature_name: &str,
    ) -> RepositoryResult<Option<FeatureFlag>> {
        self.table.get(env_name, Some(feature_name)).await
    }

    #[instrument(skip(self), fields(table = %self.table.table_name(), env_name = %env_name))]
    async fn list_by_environment(&self, env_name: &str) -> RepositoryResult<Vec<FeatureFlag>> {
        let flags: Vec<FeatureFlag> = self
            .table
            .query_by_partition_key(env_name)
            .try_collect()
            .await?;
        info!("Found {} feature flags", flags.len());
        Ok(flags)
    }

    #[instrument(skip(self, cursor), fields(table = %self.table.table_name(), env_name = %env_name))]
    async fn list_by_environment_page(
        &self,
        env_name: &str,
        page_size: u32,
        cursor: Option<Cursor>,
    ) -> RepositoryResult<Page<FeatureFlag>> {
        self.table
            .query_by_partition_key_paginated(env_name, page_size, cursor)
            .await
    }

    #[instrument(skip(self), fields(table = %self.table.table_name(), index = USER_INDEX, env_name = %env_name, user_id = %user_id))]
    async fn list_by_environment_for_user(
        &self,
        env_name: &str,
        user_id: &str,
    ) -> RepositoryResult<Vec<FeatureFlag>> {
        let flags: Vec<FeatureFlag> = self
            .table
            .query_by_index_sort_key(USER_INDEX, user_id, env_name)
            .try_collect()
            .await?;
        info!("Found {} feature flags for user", flags.len());
        Ok(flags)
    }

    #[instrument(skip(self, cursor), fields(table = %self.table.table_name(), index = USER_INDEX, env_name = %env_name, user_id = %user_id))]
    async fn list_by_environment_for_user_page(
        &self,
        env_name: &str,
        user_id: &str,
        page_size: u32,
        cursor: Option<Cursor>,
    ) -> RepositoryResult<Page<FeatureFlag>> {
        self.table
            .query_by_index_paginated(
                USER_INDEX,
                user_id,
                Some(SortKeyCondition::Equal(env_name.to_string())),
                page_size,
                cursor,
            )
            .await
    }

    #[instrument(skip(self), fields(table = %self.table.table_name(), index = USER_INDEX, user_id = %user_id))]
    async fn list_for_user(&self, user_id: &str) -> RepositoryResult<Vec<FeatureFlag>> {
        self.table
            .query_by_index(USER_INDEX, user_id)
            .try_collect()
            .await
    }

    #[instrument(skip(self), fields(table = %self.table.table_name(), env_name = %env_name, feature_name = %feature_name))]
    async fn delete(&self, env_name: &str, feature_name: &str) -> RepositoryResult<()> {
        info!("Deleting feature flag");
        self.table.delete(env_name, Some(feature_name)).await
    }
}
