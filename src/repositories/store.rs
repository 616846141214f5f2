use async_trait::async_trait;

use super::condition::{AttributeFilter, KeyCondition};
use super::schema::{Item, KeySchema};
use crate::models::StoreResult;

/// A key-conditional read against a table or one of its indexes
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub table_name: String,
    pub index_name: Option<String>,
    /// Key schema of whatever is being queried: the table or the index
    pub key: KeySchema,
    pub condition: KeyCondition,
    pub filter: Option<AttributeFilter>,
    pub limit: Option<u32>,
    pub exclusive_start_key: Option<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub table_name: String,
    pub limit: Option<u32>,
    pub exclusive_start_key: Option<Item>,
}

/// One response worth of items
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPage {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}

/// Partition/sort-key table backend.
///
/// Implementations must be safe to share between concurrent requests. Absent
/// items are not errors, and deleting a missing key succeeds.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Insert or fully replace an item
    async fn put_item(&self, table_name: &str, item: Item) -> StoreResult<()>;

    /// Strongly consistent read by primary key
    async fn get_item(&self, table_name: &str, key: Item) -> StoreResult<Option<Item>>;

    async fn delete_item(&self, table_name: &str, key: Item) -> StoreResult<()>;

    async fn query(&self, request: QueryRequest) -> StoreResult<ItemPage>;

    async fn scan(&self, request: ScanRequest) -> StoreResult<ItemPage>;
}
