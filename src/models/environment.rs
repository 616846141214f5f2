use serde::{Deserialize, Serialize};

/// An owner's deployment environment (e.g. `prod`, `staging`).
///
/// Keyed by `userId` with `name` as the sort key. The persisted attribute names
/// are the camelCase field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Request model for creating an environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEnvironmentRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Environment {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build an environment owned by `user_id` from a validated request
    pub fn from_request(user_id: &str, request: CreateEnvironmentRequest) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: request.name.trim().to_string(),
            description: request
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_json_uses_persisted_names() {
        let env = Environment::new("u1", "prod").with_description("Production");
        let value = serde_json::to_value(&env).unwrap();

        assert_eq!(value["userId"], "u1");
        assert_eq!(value["name"], "prod");
        assert_eq!(value["description"], "Production");
    }

    #[test]
    fn test_from_request_trims_and_drops_blank_description() {
        let request = CreateEnvironmentRequest {
            name: "  staging ".to_string(),
            description: Some("   ".to_string()),
        };

        let env = Environment::from_request("u2", request);
        assert_eq!(env.user_id, "u2");
        assert_eq!(env.name, "staging");
        assert_eq!(env.description, None);
    }
}
