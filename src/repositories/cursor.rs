use aws_sdk_dynamodb::types::AttributeValue;
use aws_smithy_types::Blob;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use super::schema::Item;
use crate::models::{RepositoryError, RepositoryResult};

/// Opaque continuation token for paginated reads.
///
/// Wraps the store's last-evaluated key. On the wire it is URL-safe base64 of a
/// small JSON object, so callers can pass it through query strings untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(BTreeMap<String, KeyValue>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum KeyValue {
    S(String),
    N(String),
    /// base64 of the raw bytes
    B(String),
}

impl Cursor {
    pub(crate) fn from_item(item: Item) -> RepositoryResult<Self> {
        let mut values = BTreeMap::new();
        for (name, value) in item {
            let value = match value {
                AttributeValue::S(s) => KeyValue::S(s),
                AttributeValue::N(n) => KeyValue::N(n),
                AttributeValue::B(b) => KeyValue::B(URL_SAFE_NO_PAD.encode(b.as_ref())),
                other => {
                    return Err(RepositoryError::InvalidCursor {
                        message: format!("unsupported key attribute `{}`: {:?}", name, other),
                    })
                }
            };
            values.insert(name, value);
        }
        Ok(Self(values))
    }

    pub(crate) fn into_item(self) -> RepositoryResult<Item> {
        self.0
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    KeyValue::S(s) => AttributeValue::S(s),
                    KeyValue::N(n) => AttributeValue::N(n),
                    KeyValue::B(b) => {
                        let bytes = URL_SAFE_NO_PAD.decode(b.as_bytes()).map_err(|e| {
                            RepositoryError::InvalidCursor {
                                message: e.to_string(),
                            }
                        })?;
                        AttributeValue::B(Blob::new(bytes))
                    }
                };
                Ok((name, value))
            })
            .collect()
    }

    pub fn encode(&self) -> RepositoryResult<String> {
        let json = serde_json::to_vec(&self.0).map_err(|e| RepositoryError::Serialization {
            entity: "Cursor",
            message: e.to_string(),
        })?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn decode(token: &str) -> RepositoryResult<Self> {
        let invalid = |message: String| RepositoryError::InvalidCursor { message };

        let json = URL_SAFE_NO_PAD
            .decode(token.trim().as_bytes())
            .map_err(|e| invalid(e.to_string()))?;
        let values: BTreeMap<String, KeyValue> =
            serde_json::from_slice(&json).map_err(|e| invalid(e.to_string()))?;

        if values.is_empty() {
            return Err(invalid("cursor carries no key attributes".to_string()));
        }
        Ok(Self(values))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode().map_err(|_| fmt::Error)?)
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let token = self.encode().map_err(ser::Error::custom)?;
        serializer.serialize_str(&token)
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Cursor::decode(&token).map_err(de::Error::custom)
    }
}

/// One page of a paginated read
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}
