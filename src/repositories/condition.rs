use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;

use super::schema::{Item, KeySchema};
use crate::models::{RepositoryError, RepositoryResult};

/// Condition on the sort key of a table or index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKeyCondition {
    Equal(String),
    LessThan(String),
    LessThanOrEqual(String),
    GreaterThan(String),
    GreaterThanOrEqual(String),
    /// Inclusive on both ends
    Between(String, String),
    BeginsWith(String),
}

impl SortKeyCondition {
    /// Evaluate against a string sort key using byte-wise ordering, as DynamoDB does
    pub fn matches(&self, value: &str) -> bool {
        match self {
            SortKeyCondition::Equal(v) => value == v,
            SortKeyCondition::LessThan(v) => value < v.as_str(),
            SortKeyCondition::LessThanOrEqual(v) => value <= v.as_str(),
            SortKeyCondition::GreaterThan(v) => value > v.as_str(),
            SortKeyCondition::GreaterThanOrEqual(v) => value >= v.as_str(),
            SortKeyCondition::Between(low, high) => value >= low.as_str() && value <= high.as_str(),
            SortKeyCondition::BeginsWith(prefix) => value.starts_with(prefix.as_str()),
        }
    }

    fn render(&self, name: &str, values: &mut Item) -> String {
        let mut bind = |placeholder: &str, value: &String| {
            values.insert(placeholder.to_string(), AttributeValue::S(value.clone()));
        };

        match self {
            SortKeyCondition::Equal(v) => {
                bind(":sk", v);
                format!("{} = :sk", name)
            }
            SortKeyCondition::LessThan(v) => {
                bind(":sk", v);
                format!("{} < :sk", name)
            }
            SortKeyCondition::LessThanOrEqual(v) => {
                bind(":sk", v);
                format!("{} <= :sk", name)
            }
            SortKeyCondition::GreaterThan(v) => {
                bind(":sk", v);
                format!("{} > :sk", name)
            }
            SortKeyCondition::GreaterThanOrEqual(v) => {
                bind(":sk", v);
                format!("{} >= :sk", name)
            }
            SortKeyCondition::Between(low, high) => {
                bind(":sk_low", low);
                bind(":sk_high", high);
                format!("{} BETWEEN :sk_low AND :sk_high", name)
            }
            SortKeyCondition::BeginsWith(prefix) => {
                bind(":sk", prefix);
                format!("begins_with({}, :sk)", name)
            }
        }
    }
}

/// Partition equality plus an optional sort key condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCondition {
    pub partition_value: String,
    pub sort: Option<SortKeyCondition>,
}

impl KeyCondition {
    pub fn partition(value: impl Into<String>) -> Self {
        Self {
            partition_value: value.into(),
            sort: None,
        }
    }

    pub fn with_sort(mut self, condition: SortKeyCondition) -> Self {
        self.sort = Some(condition);
        self
    }

    /// A sort condition is only meaningful when the key schema has a sort key
    pub fn validate(&self, key: &KeySchema) -> RepositoryResult<()> {
        if self.sort.is_some() && key.sort_key.is_none() {
            return Err(RepositoryError::InvalidQuery {
                message: format!(
                    "key `{}` has no sort key to apply a condition to",
                    key.partition_key
                ),
            });
        }
        Ok(())
    }
}

/// Equality filter applied by the store after the key condition
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeFilter {
    pub attribute: String,
    pub value: AttributeValue,
}

impl AttributeFilter {
    pub fn equals(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: AttributeValue::S(value.into()),
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        item.get(&self.attribute) == Some(&self.value)
    }
}

/// Query expressions ready for the DynamoDB API.
///
/// Attribute names always go through `#` placeholders: several persisted
/// names (`name`, `key`, `type`) are reserved words.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryExpression {
    pub key_condition: String,
    pub filter: Option<String>,
    pub names: HashMap<String, String>,
    pub values: Item,
}

impl QueryExpression {
    pub fn render(
        key: &KeySchema,
        condition: &KeyCondition,
        filter: Option<&AttributeFilter>,
    ) -> Self {
        let mut names = HashMap::new();
        let mut values = Item::new();

        names.insert("#pk".to_string(), key.partition_key.to_string());
        values.insert(
            ":pk".to_string(),
            AttributeValue::S(condition.partition_value.clone()),
        );
        let mut key_condition = "#pk = :pk".to_string();

        if let (Some(sort), Some(sort_attribute)) = (&condition.sort, key.sort_key) {
            names.insert("#sk".to_string(), sort_attribute.to_string());
            key_condition.push_str(" AND ");
            key_condition.push_str(&sort.render("#sk", &mut values));
        }

        let filter = filter.map(|filter| {
            names.insert("#filter".to_string(), filter.attribute.clone());
            values.insert(":filter".to_string(), filter.value.clone());
            "#filter = :filter".to_string()
        });

        Self {
            key_condition,
            filter,
            names,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLAGS: KeySchema = KeySchema::composite("EnvName", "FeatureName");

    #[test]
    fn test_sort_conditions_match() {
        assert!(SortKeyCondition::Equal("b".into()).matches("b"));
        assert!(SortKeyCondition::LessThan("b".into()).matches("a"));
        assert!(!SortKeyCondition::LessThan("b".into()).matches("b"));
        assert!(SortKeyCondition::LessThanOrEqual("b".into()).matches("b"));
        assert!(SortKeyCondition::GreaterThan("b".into()).matches("c"));
        assert!(SortKeyCondition::GreaterThanOrEqual("b".into()).matches("b"));
        assert!(SortKeyCondition::Between("b".into(), "d".into()).matches("d"));
        assert!(!SortKeyCondition::Between("b".into(), "d".into()).matches("da"));
        assert!(SortKeyCondition::BeginsWith("dark".into()).matches("dark-mode"));
        assert!(!SortKeyCondition::BeginsWith("dark".into()).matches("light"));
    }

    #[test]
    fn test_render_partition_only() {
        let expression = QueryExpression::render(&FLAGS, &KeyCondition::partition("prod"), None);

        assert_eq!(expression.key_condition, "#pk = :pk");
        assert_eq!(expression.names.get("#pk").map(String::as_str), Some("EnvName"));
        assert_eq!(expression.values.get(":pk"), Some(&AttributeValue::S("prod".into())));
        assert!(expression.filter.is_none());
    }

    #[test]
    fn test_render_between_and_filter() {
        let condition = KeyCondition::partition("prod")
            .with_sort(SortKeyCondition::Between("a".into(), "m".into()));
        let filter = AttributeFilter::equals("userId", "u1");

        let expression = QueryExpression::render(&FLAGS, &condition, Some(&filter));

        assert_eq!(
            expression.key_condition,
            "#pk = :pk AND #sk BETWEEN :sk_low AND :sk_high"
        );
        assert_eq!(expression.filter.as_deref(), Some("#filter = :filter"));
        assert_eq!(expression.names.len(), 3);
        assert_eq!(expression.values.len(), 4);
    }

    #[test]
    fn test_render_begins_with() {
        let condition =
            KeyCondition::partition("prod").with_sort(SortKeyCondition::BeginsWith("dark".into()));
        let expression = QueryExpression::render(&FLAGS, &condition, None);
        assert_eq!(expression.key_condition, "#pk = :pk AND begins_with(#sk, :sk)");
    }

    #[test]
    fn test_sort_condition_requires_sort_key() {
        let condition = KeyCondition::partition("u1").with_sort(SortKeyCondition::Equal("x".into()));
        assert!(condition.validate(&FLAGS).is_ok());
        assert!(condition.validate(&KeySchema::partition("userId")).is_err());
    }
}
