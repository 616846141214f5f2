use super::{
    CreateEnvironmentRequest, FeatureFlagRequest, GenerateApiKeyRequest, ValidationError,
    ValidationResult,
};

/// Trait for validating input models
pub trait Validate {
    fn validate(&self) -> ValidationResult<()>;
}

/// Validation constants
pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;
pub const MAX_FLAG_TYPE_LENGTH: usize = 64;
/// Items are capped at 400KB by DynamoDB; keep flag payloads well under it.
pub const MAX_CONFIG_LENGTH: usize = 64 * 1024;

impl Validate for CreateEnvironmentRequest {
    fn validate(&self) -> ValidationResult<()> {
        validate_name("name", &self.name)?;
        if let Some(description) = &self.description {
            validate_max_length("description", description, MAX_DESCRIPTION_LENGTH)?;
        }
        Ok(())
    }
}

impl Validate for FeatureFlagRequest {
    fn validate(&self) -> ValidationResult<()> {
        validate_name("envName", &self.env_name)?;
        validate_name("featureName", &self.feature_name)?;
        validate_flag_type(&self.flag_type)?;
        if let Some(config) = &self.config {
            validate_config(config)?;
        }
        Ok(())
    }
}

impl Validate for GenerateApiKeyRequest {
    fn validate(&self) -> ValidationResult<()> {
        validate_name("env", &self.env)
    }
}

/// Validate a key-bearing name such as an environment or feature name
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::RequiredField {
            field: field.to_string(),
        });
    }

    validate_max_length(field, trimmed, MAX_NAME_LENGTH)?;

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            value: name.to_string(),
            reason: "Contains invalid control characters".to_string(),
        });
    }

    Ok(())
}

/// Flag types are caller-defined; only shape is checked here
pub fn validate_flag_type(flag_type: &str) -> ValidationResult<()> {
    let trimmed = flag_type.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::RequiredField {
            field: "type".to_string(),
        });
    }

    validate_max_length("type", trimmed, MAX_FLAG_TYPE_LENGTH)
}

/// Validate that a flag payload is a JSON document
pub fn validate_config(config: &str) -> ValidationResult<()> {
    validate_max_length("config", config, MAX_CONFIG_LENGTH)?;

    if serde_json::from_str::<serde_json::Value>(config).is_err() {
        return Err(ValidationError::InvalidFormat {
            field: "config".to_string(),
            expected: "JSON document".to_string(),
        });
    }

    Ok(())
}

fn validate_max_length(field: &str, value: &str, max_length: usize) -> ValidationResult<()> {
    if value.len() > max_length {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max_length,
            actual_length: value.len(),
        });
    }
    Ok(())
}
