use aws_sdk_dynamodb::types::AttributeValue;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::models::{RepositoryError, RepositoryResult};

/// A raw store item: attribute name to value
pub type Item = HashMap<String, AttributeValue>;

/// Which attributes make up a table's (or an index's) key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySchema {
    pub partition_key: &'static str,
    pub sort_key: Option<&'static str>,
}

/// A named global secondary index over an entity's table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSchema {
    pub name: &'static str,
    pub key: KeySchema,
}

/// Static description of the table an entity lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub table_name: &'static str,
    pub key: KeySchema,
    pub indexes: &'static [IndexSchema],
}

impl KeySchema {
    pub const fn partition(partition_key: &'static str) -> Self {
        Self {
            partition_key,
            sort_key: None,
        }
    }

    pub const fn composite(partition_key: &'static str, sort_key: &'static str) -> Self {
        Self {
            partition_key,
            sort_key: Some(sort_key),
        }
    }

    /// Names of the key attributes, partition first
    pub fn attributes(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.partition_key).chain(self.sort_key)
    }
}

impl TableSchema {
    pub fn index(&self, name: &str) -> Option<&'static IndexSchema> {
        self.indexes.iter().find(|index| index.name == name)
    }
}

/// A typed record bound to one table.
///
/// Implementors declare their table layout through [`Entity::SCHEMA`] and hand
/// out their own key values; conversion to and from store items goes through
/// serde, so the serde field names are the persisted attribute names.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Short name used in logs and errors
    const ENTITY_TYPE: &'static str;

    const SCHEMA: TableSchema;

    fn partition_key(&self) -> &str;

    fn sort_key(&self) -> Option<&str> {
        None
    }

    fn key(&self) -> Key {
        Key {
            partition: self.partition_key().to_string(),
            sort: self.sort_key().map(str::to_string),
        }
    }
}

/// Raw primary key values
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    pub partition: String,
    pub sort: Option<String>,
}

impl Key {
    pub fn new(partition: impl Into<String>, sort: Option<&str>) -> Self {
        Self {
            partition: partition.into(),
            sort: sort.map(str::to_string),
        }
    }

    /// Render the key as a store item, checking it has the shape the schema needs
    pub fn to_item(&self, schema: &KeySchema) -> RepositoryResult<Item> {
        let mut item = Item::new();
        item.insert(
            schema.partition_key.to_string(),
            AttributeValue::S(self.partition.clone()),
        );

        match (schema.sort_key, &self.sort) {
            (Some(attribute), Some(value)) => {
                item.insert(attribute.to_string(), AttributeValue::S(value.clone()));
            }
            (None, None) => {}
            (Some(attribute), None) => {
                return Err(RepositoryError::InvalidQuery {
                    message: format!("sort key `{}` is required", attribute),
                });
            }
            (None, Some(_)) => {
                return Err(RepositoryError::InvalidQuery {
                    message: format!(
                        "table keyed only by `{}` does not take a sort key",
                        schema.partition_key
                    ),
                });
            }
        }

        Ok(item)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sort {
            Some(sort) => write!(f, "{}/{}", self.partition, sort),
            None => write!(f, "{}", self.partition),
        }
    }
}
