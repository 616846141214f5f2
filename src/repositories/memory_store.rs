use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::condition::AttributeFilter;
use super::schema::{Item, KeySchema, TableSchema};
use super::store::{ItemPage, QueryRequest, ScanRequest, TableStore};
use crate::models::{StoreError, StoreResult};

/// Ordering of an item within a read: the queried sort key, then the table key
type Position = (Option<String>, String, Option<String>);

struct MemoryTable {
    schema: TableSchema,
    items: BTreeMap<(String, Option<String>), Item>,
}

/// In-process [`TableStore`] that behaves like a DynamoDB table.
///
/// Items sort by sort key within a partition, global secondary indexes are
/// sparse, `Limit` is applied before the filter and continuation goes through
/// `LastEvaluatedKey`. Only string key attributes are supported.
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, MemoryTable>>,
    max_page_items: Option<usize>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            max_page_items: None,
        }
    }

    /// Register a table under `table_name` with the given key layout
    pub fn with_table(mut self, table_name: impl Into<String>, schema: &TableSchema) -> Self {
        self.tables.get_mut().insert(
            table_name.into(),
            MemoryTable {
                schema: *schema,
                items: BTreeMap::new(),
            },
        );
        self
    }

    /// Cap every response at `max` items, the way the 1MB response limit splits large reads
    pub fn with_max_page_items(mut self, max: usize) -> Self {
        self.max_page_items = Some(max.max(1));
        self
    }

    pub async fn item_count(&self, table_name: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table_name)
            .map(|table| table.items.len())
            .unwrap_or(0)
    }

    fn effective_limit(&self, requested: Option<u32>) -> StoreResult<Option<usize>> {
        if requested == Some(0) {
            return Err(StoreError::Validation {
                message: "Limit must be greater than or equal to 1".to_string(),
            });
        }

        let requested = requested.map(|limit| limit as usize);
        Ok(match (requested, self.max_page_items) {
            (Some(limit), Some(max)) => Some(limit.min(max)),
            (limit, max) => limit.or(max),
        })
    }
}

fn table<'a>(
    tables: &'a HashMap<String, MemoryTable>,
    table_name: &str,
) -> StoreResult<&'a MemoryTable> {
    tables
        .get(table_name)
        .ok_or_else(|| StoreError::ResourceNotFound {
            table_name: table_name.to_string(),
        })
}

fn string_attribute<'a>(item: &'a Item, name: &str) -> Option<&'a str> {
    item.get(name)
        .and_then(|value| value.as_s().ok())
        .map(String::as_str)
}

fn key_attribute(item: &Item, name: &str) -> StoreResult<String> {
    match string_attribute(item, name) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        Some(_) => Err(StoreError::Validation {
            message: format!("key attribute `{}` cannot be an empty string", name),
        }),
        None => Err(StoreError::Validation {
            message: format!("missing string key attribute `{}`", name),
        }),
    }
}

fn primary_key(key: &KeySchema, item: &Item) -> StoreResult<(String, Option<String>)> {
    let partition = key_attribute(item, key.partition_key)?;
    let sort = key
        .sort_key
        .map(|attribute| key_attribute(item, attribute))
        .transpose()?;
    Ok((partition, sort))
}

/// Key lookups must name exactly the key attributes
fn lookup_key(key: &KeySchema, item: &Item) -> StoreResult<(String, Option<String>)> {
    if item.len() != key.attributes().count() {
        return Err(StoreError::Validation {
            message: "the provided key element does not match the schema".to_string(),
        });
    }
    primary_key(key, item)
}

fn project(item: &Item, attributes: &[&str]) -> Item {
    attributes
        .iter()
        .filter_map(|name| {
            item.get(*name)
                .map(|value| (name.to_string(), value.clone()))
        })
        .collect()
}

fn read_page(
    candidates: Vec<(Position, &Item)>,
    start: Option<Position>,
    limit: Option<usize>,
    filter: Option<&AttributeFilter>,
    key_attributes: &[&str],
) -> ItemPage {
    let remaining: Vec<(Position, &Item)> = candidates
        .into_iter()
        .filter(|(position, _)| start.as_ref().map_or(true, |start| position > start))
        .collect();

    let take = limit.unwrap_or(remaining.len()).min(remaining.len());
    let evaluated = &remaining[..take];

    let items = evaluated
        .iter()
        .filter(|(_, item)| filter.map_or(true, |filter| filter.matches(item)))
        .map(|(_, item)| (*item).clone())
        .collect();

    let last_evaluated_key = if take < remaining.len() {
        evaluated
            .last()
            .map(|(_, item)| project(item, key_attributes))
    } else {
        None
    };

    ItemPage {
        items,
        last_evaluated_key,
    }
}

#[async_trait]
impl TableStore for InMemoryStore {
    async fn put_item(&self, table_name: &str, item: Item) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| StoreError::ResourceNotFound {
                table_name: table_name.to_string(),
            })?;

        let key = primary_key(&table.schema.key, &item)?;
        table.items.insert(key, item);
        Ok(())
    }

    async fn get_item(&self, table_name: &str, key: Item) -> StoreResult<Option<Item>> {
        let tables = self.tables.read().await;
        let table = table(&tables, table_name)?;

        let key = lookup_key(&table.schema.key, &key)?;
        Ok(table.items.get(&key).cloned())
    }

    async fn delete_item(&self, table_name: &str, key: Item) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| StoreError::ResourceNotFound {
                table_name: table_name.to_string(),
            })?;

        let key = lookup_key(&table.schema.key, &key)?;
        table.items.remove(&key);
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> StoreResult<ItemPage> {
        let tables = self.tables.read().await;
        let table = table(&tables, &request.table_name)?;
        let limit = self.effective_limit(request.limit)?;

        let key = match &request.index_name {
            Some(index_name) => {
                table
                    .schema
                    .index(index_name)
                    .map(|index| index.key)
                    .ok_or_else(|| StoreError::Validation {
                        message: format!(
                            "the table does not have the specified index: {}",
                            index_name
                        ),
                    })?
            }
            None => table.schema.key,
        };
        let table_key = table.schema.key;

        let mut candidates: Vec<(Position, &Item)> = table
            .items
            .iter()
            .filter_map(|((partition, sort), item)| {
                if string_attribute(item, key.partition_key)? != request.condition.partition_value
                {
                    return None;
                }
                // Items missing the index sort key are not projected
                let query_sort = match key.sort_key {
                    Some(attribute) => Some(string_attribute(item, attribute)?.to_string()),
                    None => None,
                };
                if let (Some(condition), Some(value)) = (&request.condition.sort, &query_sort) {
                    if !condition.matches(value) {
                        return None;
                    }
                }
                Some(((query_sort, partition.clone(), sort.clone()), item))
            })
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        let start = request
            .exclusive_start_key
            .as_ref()
            .map(|start| -> StoreResult<Position> {
                let (partition, sort) = primary_key(&table_key, start)?;
                let query_sort = key
                    .sort_key
                    .map(|attribute| key_attribute(start, attribute))
                    .transpose()?;
                Ok((query_sort, partition, sort))
            })
            .transpose()?;

        let mut key_attributes: Vec<&str> = table_key.attributes().collect();
        for attribute in key.attributes() {
            if !key_attributes.contains(&attribute) {
                key_attributes.push(attribute);
            }
        }

        Ok(read_page(
            candidates,
            start,
            limit,
            request.filter.as_ref(),
            &key_attributes,
        ))
    }

    async fn scan(&self, request: ScanRequest) -> StoreResult<ItemPage> {
        let tables = self.tables.read().await;
        let table = table(&tables, &request.table_name)?;
        let limit = self.effective_limit(request.limit)?;

        let candidates = table
            .items
            .iter()
            .map(|((partition, sort), item)| ((None, partition.clone(), sort.clone()), item))
            .collect();

        let start = request
            .exclusive_start_key
            .as_ref()
            .map(|start| primary_key(&table.schema.key, start))
            .transpose()?
            .map(|(partition, sort)| (None, partition, sort));

        let key_attributes: Vec<&str> = table.schema.key.attributes().collect();
        Ok(read_page(candidates, start, limit, None, &key_attributes))
    }
}
