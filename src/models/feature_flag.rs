use serde::{Deserialize, Serialize};

/// A feature flag scoped to an environment.
///
/// Stored under `EnvName`/`FeatureName` with the owning user also projected
/// into the `FFUserId` index (`userId`, `EnvName`). The serde names below are
/// the persisted attribute names and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    #[serde(rename = "EnvName")]
    pub env_name: String,
    #[serde(rename = "FeatureName")]
    pub feature_name: String,
    #[serde(rename = "type")]
    pub flag_type: String,
    /// Opaque serialized payload, usually JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Request model for creating or replacing a feature flag
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagRequest {
    pub env_name: String,
    #[serde(rename = "type")]
    pub flag_type: String,
    pub feature_name: String,
    #[serde(default)]
    pub config: Option<String>,
}

/// API representation of a feature flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagResponse {
    pub env_name: String,
    pub feature_name: String,
    #[serde(rename = "type")]
    pub flag_type: String,
    pub config: Option<String>,
    pub user_id: String,
}

impl FeatureFlag {
    pub fn new(
        env_name: impl Into<String>,
        feature_name: impl Into<String>,
        flag_type: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            env_name: env_name.into(),
            feature_name: feature_name.into(),
            flag_type: flag_type.into(),
            config: None,
            user_id: user_id.into(),
        }
    }

    pub fn with_config(mut self, config: impl Into<String>) -> Self {
        self.config = Some(config.into());
        self
    }

    /// Build a flag owned by `user_id` from a validated request
    pub fn from_request(user_id: &str, request: FeatureFlagRequest) -> Self {
        Self {
            env_name: request.env_name.trim().to_string(),
            feature_name: request.feature_name.trim().to_string(),
            flag_type: request.flag_type.trim().to_string(),
            config: request.config,
            user_id: user_id.to_string(),
        }
    }
}

impl From<FeatureFlag> for FeatureFlagResponse {
    fn from(flag: FeatureFlag) -> Self {
        Self {
            env_name: flag.env_name,
            feature_name: flag.feature_name,
            flag_type: flag.flag_type,
            config: flag.config,
            user_id: flag.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserializes_from_camel_case() {
        let request: FeatureFlagRequest = serde_json::from_str(
            r#"{"envName":"prod","type":"BOOLEAN","featureName":"dark-mode","config":"{\"enabled\":true}"}"#,
        )
        .unwrap();

        assert_eq!(request.env_name, "prod");
        assert_eq!(request.flag_type, "BOOLEAN");
        assert_eq!(request.feature_name, "dark-mode");
        assert_eq!(request.config.as_deref(), Some(r#"{"enabled":true}"#));
    }

    #[test]
    fn test_from_request_sets_owner() {
        let request = FeatureFlagRequest {
            env_name: "prod".to_string(),
            flag_type: "BOOLEAN".to_string(),
            feature_name: " dark-mode ".to_string(),
            config: None,
        };

        let flag = FeatureFlag::from_request("u1", request);
        assert_eq!(flag.user_id, "u1");
        assert_eq!(flag.feature_name, "dark-mode");
    }

    #[test]
    fn test_response_uses_api_names() {
        let flag = FeatureFlag::new("prod", "dark-mode", "BOOLEAN", "u1");
        let value = serde_json::to_value(FeatureFlagResponse::from(flag)).unwrap();

        assert_eq!(value["envName"], "prod");
        assert_eq!(value["featureName"], "dark-mode");
        assert_eq!(value["type"], "BOOLEAN");
        assert_eq!(value["userId"], "u1");
    }
}
