use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::repositories::TableNames;

pub const ENV_PREFIX: &str = "FEATUREFLAG";
pub const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {message}")]
    LoadError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

/// Service configuration, read from `FEATUREFLAG_<SECTION>__<KEY>` variables
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
}

/// Where entities are persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    DynamoDb,
    /// Process-local tables; contents are lost on restart
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub storage_backend: StorageBackend,
    #[serde(default = "default_region")]
    pub region: String,
    /// Overrides the DynamoDB endpoint, e.g. for DynamoDB Local
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_environments_table")]
    pub environments_table_name: String,
    #[serde(default = "default_feature_flags_table")]
    pub feature_flags_table_name: String,
    #[serde(default = "default_api_keys_table")]
    pub api_keys_table_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_service_version")]
    pub service_version: String,
    /// OTLP/gRPC collector; traces are only exported when set
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default)]
    pub enable_json_logging: bool,
    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,
}

impl Config {
    /// Load from the process environment and validate
    pub fn from_environment() -> Result<Self, ConfigError> {
        info!("Loading configuration from environment");
        Self::from_source(environment_source(None))
    }

    pub(crate) fn from_source<S>(source: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(source)
            .build()
            .map_err(|e| ConfigError::LoadError {
                message: format!("Failed to load config: {}", e),
            })?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| ConfigError::LoadError {
                message: format!("Failed to deserialize config: {}", e),
            })?;

        config.validate()?;

        debug!("Configuration: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError {
                message: "Server port cannot be 0".to_string(),
            });
        }

        if self.server.request_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError {
                message: "Request timeout cannot be 0".to_string(),
            });
        }

        let tables = [
            ("environments", &self.database.environments_table_name),
            ("feature flags", &self.database.feature_flags_table_name),
            ("API keys", &self.database.api_keys_table_name),
        ];
        for (label, name) in tables {
            if name.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    message: format!("The {} table name cannot be empty", label),
                });
            }
        }

        if self.database.storage_backend == StorageBackend::DynamoDb
            && self.database.region.trim().is_empty()
        {
            return Err(ConfigError::ValidationError {
                message: "A region is required for the dynamodb storage backend".to_string(),
            });
        }

        Ok(())
    }
}

/// Environment source with the service prefix; `vars` replaces the process
/// environment when given
pub(crate) fn environment_source(
    vars: Option<config::Map<String, String>>,
) -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator(ENV_SEPARATOR)
        .source(vars)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::default(),
            region: default_region(),
            endpoint_url: None,
            environments_table_name: default_environments_table(),
            feature_flags_table_name: default_feature_flags_table(),
            api_keys_table_name: default_api_keys_table(),
        }
    }
}

impl DatabaseConfig {
    pub fn table_names(&self) -> TableNames {
        TableNames {
            environments: self.environments_table_name.clone(),
            feature_flags: self.feature_flags_table_name.clone(),
            api_keys: self.api_keys_table_name.clone(),
        }
    }

    /// DynamoDB client for the configured region and endpoint
    pub async fn dynamodb_client(&self) -> DynamoDbClient {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(self.region.clone()));

        if let Some(endpoint_url) = &self.endpoint_url {
            info!(endpoint_url = %endpoint_url, "Using custom DynamoDB endpoint");
            loader = loader.endpoint_url(endpoint_url.clone());
        }

        DynamoDbClient::new(&loader.load().await)
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            service_version: default_service_version(),
            otlp_endpoint: None,
            enable_json_logging: false,
            enable_metrics: default_enable_metrics(),
        }
    }
}

// Default value functions
pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

pub(crate) fn default_timeout() -> u64 {
    30
}

pub(crate) fn default_region() -> String {
    "us-east-1".to_string()
}

pub(crate) fn default_environments_table() -> String {
    "Environment".to_string()
}

pub(crate) fn default_feature_flags_table() -> String {
    "FeatureFlag".to_string()
}

pub(crate) fn default_api_keys_table() -> String {
    "EnvApiKey".to_string()
}

pub(crate) fn default_service_name() -> String {
    "featureflag-rs".to_string()
}

pub(crate) fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub(crate) fn default_enable_metrics() -> bool {
    true
}
