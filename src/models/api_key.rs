use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An API key issued for an environment. Stored under `EnvName`/`key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    #[serde(rename = "EnvName")]
    pub env_name: String,
    pub key: String,
    pub active: bool,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Request model for generating a new key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateApiKeyRequest {
    pub env: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyResponse {
    pub env_name: String,
    pub key: String,
    pub active: bool,
    pub user_id: String,
}

impl ApiKey {
    pub fn new(
        env_name: impl Into<String>,
        key: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            env_name: env_name.into(),
            key: key.into(),
            active: true,
            user_id: user_id.into(),
        }
    }

    /// Issue a fresh active key with a random v4 UUID token
    pub fn generate(env_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::new(env_name, Uuid::new_v4().to_string(), user_id)
    }
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            env_name: key.env_name,
            key: key.key,
            active: key.active,
            user_id: key.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_issues_distinct_active_keys() {
        let first = ApiKey::generate("staging", "u1");
        let second = ApiKey::generate("staging", "u1");

        assert!(first.active);
        assert_eq!(first.env_name, "staging");
        assert_ne!(first.key, second.key);
        assert!(Uuid::parse_str(&first.key).is_ok());
    }
}
