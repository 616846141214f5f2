use async_stream::stream;
use futures_util::stream::{self as futures_stream, BoxStream, StreamExt};
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, to_item};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::condition::{AttributeFilter, KeyCondition};
use super::cursor::{Cursor, Page};
use super::schema::{Entity, Item, Key, TableSchema};
use super::store::{ItemPage, QueryRequest, ScanRequest, TableStore};
use crate::models::{RepositoryError, RepositoryResult, StoreError};

/// Lazily fetched, finite sequence of entities. Each page is one round trip,
/// issued only once the previous page has been consumed.
pub type EntityStream<'a, T> = BoxStream<'a, RepositoryResult<T>>;

/// Typed access to the table an [`Entity`] lives in.
///
/// This is the one place store failures are turned into [`RepositoryError`]s:
/// every failure is logged with the operation and key context, then returned
/// with the original store error as its source. Nothing is retried here.
pub struct EntityTable<T: Entity> {
    store: Arc<dyn TableStore>,
    table_name: String,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for EntityTable<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            table_name: self.table_name.clone(),
            _entity: PhantomData,
        }
    }
}

#[derive(Debug, Clone)]
enum ReadRequest {
    Query(QueryRequest),
    Scan(ScanRequest),
}

impl ReadRequest {
    fn operation(&self) -> &'static str {
        match self {
            ReadRequest::Query(_) => "query",
            ReadRequest::Scan(_) => "scan",
        }
    }

    fn set_limit(&mut self, limit: u32) {
        match self {
            ReadRequest::Query(query) => query.limit = Some(limit),
            ReadRequest::Scan(scan) => scan.limit = Some(limit),
        }
    }

    fn resume_from(&mut self, key: Item) {
        match self {
            ReadRequest::Query(query) => query.exclusive_start_key = Some(key),
            ReadRequest::Scan(scan) => scan.exclusive_start_key = Some(key),
        }
    }
}

impl fmt::Display for ReadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadRequest::Query(query) => {
                write!(f, "partition={}", query.condition.partition_value)?;
                if let Some(index) = &query.index_name {
                    write!(f, " index={}", index)?;
                }
                if let Some(sort) = &query.condition.sort {
                    write!(f, " sort={:?}", sort)?;
                }
                Ok(())
            }
            ReadRequest::Scan(_) => f.write_str("full table"),
        }
    }
}

impl<T: Entity> EntityTable<T> {
    /// Bind to the table named in the entity's schema
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self::with_table_name(store, T::SCHEMA.table_name)
    }

    /// Bind to a differently named table with the entity's key layout
    pub fn with_table_name(store: Arc<dyn TableStore>, table_name: impl Into<String>) -> Self {
        Self {
            store,
            table_name: table_name.into(),
            _entity: PhantomData,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn schema(&self) -> TableSchema {
        T::SCHEMA
    }

    /// Insert or fully replace the entity
    #[instrument(skip(self, entity), fields(table = %self.table_name, entity = T::ENTITY_TYPE, key = %entity.key()))]
    pub async fn save(&self, entity: T) -> RepositoryResult<T> {
        let key = entity.key();
        let item = to_item(&entity)
            .map_err(|e| self.serialization_error("put_item", &key, e.to_string()))?;

        self.store
            .put_item(&self.table_name, item)
            .await
            .map_err(|e| self.map_store_error("put_item", &key, e))?;

        info!("Item saved");
        Ok(entity)
    }

    /// Fetch using the key fields of `entity`; other fields are ignored
    pub async fn get_item(&self, entity: &T) -> RepositoryResult<Option<T>> {
        self.get_by_key(entity.key()).await
    }

    /// Fetch by raw key values. `sort_key` is `None` for single-key tables.
    pub async fn get(&self, partition_key: &str, sort_key: Option<&str>) -> RepositoryResult<Option<T>> {
        self.get_by_key(Key::new(partition_key, sort_key)).await
    }

    #[instrument(skip(self, key), fields(table = %self.table_name, entity = T::ENTITY_TYPE, key = %key))]
    async fn get_by_key(&self, key: Key) -> RepositoryResult<Option<T>> {
        let key_item = key.to_item(&T::SCHEMA.key)?;

        let item = self
            .store
            .get_item(&self.table_name, key_item)
            .await
            .map_err(|e| self.map_store_error("get_item", &key, e))?;

        item.map(|item| self.deserialize("get_item", &key, item))
            .transpose()
    }

    pub async fn delete_item(&self, entity: &T) -> RepositoryResult<()> {
        self.delete_by_key(entity.key()).await
    }

    /// Delete by raw key values. Deleting an absent key succeeds.
    pub async fn delete(&self, partition_key: &str, sort_key: Option<&str>) -> RepositoryResult<()> {
        self.delete_by_key(Key::new(partition_key, sort_key)).await
    }

    #[instrument(skip(self, key), fields(table = %self.table_name, entity = T::ENTITY_TYPE, key = %key))]
    async fn delete_by_key(&self, key: Key) -> RepositoryResult<()> {
        let key_item = key.to_item(&T::SCHEMA.key)?;

        self.store
            .delete_item(&self.table_name, key_item)
            .await
            .map_err(|e| self.map_store_error("delete_item", &key, e))?;

        info!("Item deleted");
        Ok(())
    }

    /// Every entity in the partition, in ascending sort key order
    pub fn query_by_partition_key(&self, partition_key: &str) -> EntityStream<'_, T> {
        self.query(KeyCondition::partition(partition_key), None)
    }

    /// Key-conditional query on the base table with an optional store-side filter.
    ///
    /// The filter runs after the key condition, so the whole matching key range
    /// is still read.
    pub fn query(&self, condition: KeyCondition, filter: Option<AttributeFilter>) -> EntityStream<'_, T> {
        self.stream_query(self.query_request(None, condition, filter))
    }

    pub async fn query_by_partition_key_paginated(
        &self,
        partition_key: &str,
        page_size: u32,
        cursor: Option<Cursor>,
    ) -> RepositoryResult<Page<T>> {
        let request = self.query_request(None, KeyCondition::partition(partition_key), None)?;
        self.read_page(ReadRequest::Query(request), page_size, cursor)
            .await
    }

    /// Full table scan. Reads every item; keep to small tables.
    pub fn scan_all(&self) -> EntityStream<'_, T> {
        self.stream(ReadRequest::Scan(self.scan_request()))
    }

    pub async fn scan_paginated(&self, page_size: u32, cursor: Option<Cursor>) -> RepositoryResult<Page<T>> {
        self.read_page(ReadRequest::Scan(self.scan_request()), page_size, cursor)
            .await
    }

    /// Build a query against the table or one of its declared indexes
    pub(crate) fn query_request(
        &self,
        index_name: Option<&str>,
        condition: KeyCondition,
        filter: Option<AttributeFilter>,
    ) -> RepositoryResult<QueryRequest> {
        let key = match index_name {
            Some(name) => {
                T::SCHEMA
                    .index(name)
                    .ok_or_else(|| RepositoryError::InvalidQuery {
                        message: format!("{} has no index named `{}`", T::ENTITY_TYPE, name),
                    })?
                    .key
            }
            None => T::SCHEMA.key,
        };
        condition.validate(&key)?;

        Ok(QueryRequest {
            table_name: self.table_name.clone(),
            index_name: index_name.map(str::to_string),
            key,
            condition,
            filter,
            limit: None,
            exclusive_start_key: None,
        })
    }

    pub(crate) fn stream_query(&self, request: RepositoryResult<QueryRequest>) -> EntityStream<'_, T> {
        match request {
            Ok(request) => self.stream(ReadRequest::Query(request)),
            Err(e) => futures_stream::once(async move { Err(e) }).boxed(),
        }
    }

    pub(crate) async fn query_page(
        &self,
        request: QueryRequest,
        page_size: u32,
        cursor: Option<Cursor>,
    ) -> RepositoryResult<Page<T>> {
        self.read_page(ReadRequest::Query(request), page_size, cursor)
            .await
    }

    fn scan_request(&self) -> ScanRequest {
        ScanRequest {
            table_name: self.table_name.clone(),
            limit: None,
            exclusive_start_key: None,
        }
    }

    fn stream(&self, mut request: ReadRequest) -> EntityStream<'_, T> {
        Box::pin(stream! {
            loop {
                let page = match self.fetch(&request).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                for item in page.items {
                    let entity = self.deserialize(request.operation(), &request, item);
                    let failed = entity.is_err();
                    yield entity;
                    if failed {
                        return;
                    }
                }

                match page.last_evaluated_key {
                    Some(key) => request.resume_from(key),
                    None => break,
                }
            }
        })
    }

    #[instrument(skip(self, request, cursor), fields(table = %self.table_name, entity = T::ENTITY_TYPE, request = %request))]
    async fn read_page(
        &self,
        mut request: ReadRequest,
        page_size: u32,
        cursor: Option<Cursor>,
    ) -> RepositoryResult<Page<T>> {
        if page_size == 0 {
            return Err(RepositoryError::InvalidQuery {
                message: "page size must be at least 1".to_string(),
            });
        }
        request.set_limit(page_size);
        if let Some(cursor) = cursor {
            request.resume_from(cursor.into_item()?);
        }

        let page = self.fetch(&request).await?;
        let items = page
            .items
            .into_iter()
            .map(|item| self.deserialize(request.operation(), &request, item))
            .collect::<RepositoryResult<Vec<T>>>()?;
        let next_cursor = page.last_evaluated_key.map(Cursor::from_item).transpose()?;

        info!(count = items.len(), has_more = next_cursor.is_some(), "Page read");
        Ok(Page { items, next_cursor })
    }

    async fn fetch(&self, request: &ReadRequest) -> RepositoryResult<ItemPage> {
        let result = match request {
            ReadRequest::Query(query) => self.store.query(query.clone()).await,
            ReadRequest::Scan(scan) => self.store.scan(scan.clone()).await,
        };
        result.map_err(|e| self.map_store_error(request.operation(), request, e))
    }

    fn deserialize(&self, operation: &'static str, context: &dyn fmt::Display, item: Item) -> RepositoryResult<T> {
        from_item(item).map_err(|e| self.serialization_error(operation, context, e.to_string()))
    }

    fn serialization_error(&self, operation: &'static str, context: &dyn fmt::Display, message: String) -> RepositoryError {
        error!(
            table = %self.table_name,
            entity = T::ENTITY_TYPE,
            operation = operation,
            key = %context,
            error = %message,
            "Item does not match entity shape"
        );
        RepositoryError::Serialization {
            entity: T::ENTITY_TYPE,
            message,
        }
    }

    fn map_store_error(&self, operation: &'static str, context: &dyn fmt::Display, error: StoreError) -> RepositoryError {
        error!(
            table = %self.table_name,
            entity = T::ENTITY_TYPE,
            operation = operation,
            key = %context,
            error = %error,
            "Store operation failed"
        );

        match error {
            StoreError::ResourceNotFound { .. } => RepositoryError::TableNotFound {
                table_name: self.table_name.clone(),
            },
            StoreError::Validation { message } => RepositoryError::InvalidQuery { message },
            error => RepositoryError::StoreUnavailable {
                operation,
                table: self.table_name.clone(),
                source: error,
            },
        }
    }
}
