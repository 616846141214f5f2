use async_trait::async_trait;
use futures_util::TryStreamExt;
use std::sync::Arc;
use tracing::{info, instrument};

use super::schema::{Entity, KeySchema, TableSchema};
use super::store::TableStore;
use super::table::EntityTable;
use crate::models::{Environment, RepositoryResult};

/// Environments are keyed by owner, then by name
pub const ENVIRONMENT_TABLE: TableSchema = TableSchema {
    table_name: "Environment",
    key: KeySchema::composite("userId", "name"),
    indexes: &[],
};

impl Entity for Environment {
    const ENTITY_TYPE: &'static str = "Environment";
    const SCHEMA: TableSchema = ENVIRONMENT_TABLE;

    fn partition_key(&self) -> &str {
        &self.user_id
    }

    fn sort_key(&self) -> Option<&str> {
        Some(&self.name)
    }
}

/// Trait defining the interface for environment data access operations
#[async_trait]
pub trait EnvironmentRepository: Send + Sync {
    /// Every environment of every owner (full table scan)
    async fn list_all(&self) -> RepositoryResult<Vec<Environment>>;

    /// Environments owned by one user
    async fn list_for_user(&self, user_id: &str) -> RepositoryResult<Vec<Environment>>;

    async fn save(&self, environment: Environment) -> RepositoryResult<Environment>;

    async fn get_by_name(&self, user_id: &str, name: &str)
        -> RepositoryResult<Option<Environment>>;

    async fn delete(&self, user_id: &str, name: &str) -> RepositoryResult<()>;
}

/// [`EnvironmentRepository`] over any [`TableStore`]
pub struct TableEnvironmentRepository {
    table: EntityTable<Environment>,
}

impl TableEnvironmentRepository {
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
impl EnvironmentRepository for TableEnvironmentRepository {
    #[instrument(skip(self), fields(table = %self.table.table_name()))]
    async fn list_all(&self) -> RepositoryResult<Vec<Environment>> {
        info!("Scanning all environments");
        let environments: Vec<Environment> = self.table.scan_all().try_collect().await?;
        info!("Found {} environments", environments.len());
        Ok(environments)
    }

    #[instrument(skip(self), fields(table = %self.table.table_name(), user_id = %user_id))]
    async fn list_for_user(&self, user_id: &str) -> RepositoryResult<Vec<Environment>> {
        info!("Listing environments for user");
        self.table.query_by_partition_key(user_id).try_collect().await
    }

    #[instrument(skip(self, environment), fields(table = %self.table.table_name(), user_id = %environment.user_id, name = %environment.name))]
    async fn save(&self, environment: Environment) -> RepositoryResult<Environment> {
        info!("Saving environment");
        self.table.save(environment).await
    }

    #[instrument(skip(self), fields(table = %self.table.table_name(), user_id = %user_id, name = %name))]
    async fn get_by_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> RepositoryResult<Option<Environment>> {
        self.table.get(user_id, Some(name)).await
    }

    #[instrument(skip(self), fields(table = %self.table.table_name(), user_id = %user_id, name = %name))]
    async fn delete(&self, user_id: &str, name: &str) -> RepositoryResult<()> {
        info!("Deleting environment");
        self.table.delete(user_id, Some(name)).await
    }
}
