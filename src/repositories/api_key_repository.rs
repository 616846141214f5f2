use async_trait::async_trait;
use futures_util::TryStreamExt;
use std::sync::Arc;
use tracing::{info, instrument};

use super::condition::{AttributeFilter, KeyCondition};
use super::schema::{Entity, KeySchema, TableSchema};
use super::store::TableStore;
use super::table::EntityTable;
use crate::models::{ApiKey, RepositoryResult};

pub const API_KEY_TABLE: TableSchema = TableSchema {
    table_name: "EnvApiKey",
    key: KeySchema::composite("EnvName", "key"),
    indexes: &[],
};

impl Entity for ApiKey {
    const ENTITY_TYPE: &'static str = "ApiKey";
    const SCHEMA: TableSchema = API_KEY_TABLE;

    fn partition_key(&self) -> &str {
        &self.env_name
    }

    fn sort_key(&self) -> Option<&str> {
        Some(&self.key)
    }
}

/// Trait defining the interface for API key data access operations
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn save(&self, key: ApiKey) -> RepositoryResult<ApiKey>;

    async fn list_by_environment(&self, env_name: &str) -> RepositoryResult<Vec<ApiKey>>;

    /// Keys of an environment owned by `user_id`.
    ///
    /// Ownership is a store-side filter over the environment partition, so
    /// every key in the environment is read.
    async fn list_by_environment_for_user(
        &self,
        env_name: &str,
        user_id: &str,
    ) -> RepositoryResult<Vec<ApiKey>>;

    async fn get_key(&self, env_name: &str, key: &str) -> RepositoryResult<Option<ApiKey>>;

    async fn delete_key(&self, env_name: &str, key: &str) -> RepositoryResult<()>;
}

/// [`ApiKeyRepository`] over any [`TableStore`]
pub struct TableApiKeyRepository {
    table: EntityTable<ApiKey>,
}

impl TableApiKeyRepository {
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
impl ApiKeyRepository for TableApiKeyRepository {
    #[instrument(skip(self, key), fields(table = %self.table.table_name(), env_name = %key.env_name))]
    async fn save(&self, key: ApiKey) -> RepositoryResult<ApiKey> {
        info!("Saving API key");
        self.table.save(key).await
    }

    #[instrument(skip(self), fields(table = %self.table.table_name(), env_name = %env_name))]
    async fn list_by_environment(&self, env_name: &str) -> RepositoryResult<Vec<ApiKey>> {
        self.table
            .query_by_partition_key(env_name)
            .try_collect()
            .await
    }

    #[instrument(skip(self), fields(table = %self.table.table_name(), env_name = %env_name, user_id = %user_id))]
    async fn list_by_environment_for_user(
        &self,
        env_name: &str,
        user_id: &str,
    ) -> RepositoryResult<Vec<ApiKey>> {
        let keys: Vec<ApiKey> = self
            .table
            .query(
                KeyCondition::partition(env_name),
                Some(AttributeFilter::equals("userId", user_id)),
            )
            .try_collect()
            .await?;
        info!("Found {} API keys for user", keys.len());
        Ok(keys)
    }

    #[instrument(skip(self, key), fields(table = %self.table.table_name(), env_name = %env_name))]
    async fn get_key(&self, env_name: &str, key: &str) -> RepositoryResult<Option<ApiKey>> {
        self.table.get(env_name, Some(key)).await
    }

    #[instrument(skip(self, key), fields(table = %self.table.table_name(), env_name = %env_name))]
    async fn delete_key(&self, env_name: &str, key: &str) -> RepositoryResult<()> {
        info!("Deleting API key");
        self.table.delete(env_name, Some(key)).await
    }
}
