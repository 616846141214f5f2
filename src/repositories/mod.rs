pub mod api_key_repository;
pub mod condition;
pub mod cursor;
pub mod dynamodb_store;
pub mod environment_repository;
pub mod feature_flag_repository;
pub mod index;
pub mod memory_store;
pub mod schema;
pub mod store;
pub mod table;


pub use api_key_repository::{ApiKeyRepository, TableApiKeyRepository, API_KEY_TABLE};
pub use condition::{AttributeFilter, KeyCondition, SortKeyCondition};
pub use cursor::{Cursor, Page};
pub use dynamodb_store::DynamoDbStore;
pub use environment_repository::{
    EnvironmentRepository, TableEnvironmentRepository, ENVIRONMENT_TABLE,
};
pub use feature_flag_repository::{
    FeatureFlagRepository, TableFeatureFlagRepository, FEATURE_FLAG_TABLE, USER_INDEX,
};
pub use index::IndexQuery;
pub use memory_store::InMemoryStore;
pub use schema::{Entity, IndexSchema, Item, Key, KeySchema, TableSchema};
pub use store::{ItemPage, QueryRequest, ScanRequest, TableStore};
pub use table::{EntityStream, EntityTable};

use std::sync::Arc;

/// Physical table names for the three entities
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub environments: String,
    pub feature_flags: String,
    pub api_keys: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            environments: ENVIRONMENT_TABLE.table_name.to_string(),
            feature_flags: FEATURE_FLAG_TABLE.table_name.to_string(),
            api_keys: API_KEY_TABLE.table_name.to_string(),
        }
    }
}

impl InMemoryStore {
    /// An in-memory store with all three tables registered
    pub fn with_tables(tables: &TableNames) -> Self {
        InMemoryStore::new()
            .with_table(tables.environments.clone(), &ENVIRONMENT_TABLE)
            .with_table(tables.feature_flags.clone(), &FEATURE_FLAG_TABLE)
            .with_table(tables.api_keys.clone(), &API_KEY_TABLE)
    }
}

/// The repositories, sharing one store handle
#[derive(Clone)]
pub struct Repositories {
    pub environments: Arc<dyn EnvironmentRepository>,
    pub feature_flags: Arc<dyn FeatureFlagRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
}

impl Repositories {
    pub fn new(store: Arc<dyn TableStore>, tables: &TableNames) -> Self {
        Self {
            environments: Arc::new(TableEnvironmentRepository::new(
                Arc::clone(&store),
                tables.environments.clone(),
            )),
            feature_flags: Arc::new(TableFeatureFlagRepository::new(
                Arc::clone(&store),
                tables.feature_flags.clone(),
            )),
            api_keys: Arc::new(TableApiKeyRepository::new(store, tables.api_keys.clone())),
        }
    }
}
