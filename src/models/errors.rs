use thiserror::Error;

/// Boxed cause kept on store errors for diagnostics
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Service-level errors that can occur in business logic
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Environment not found: user_id={user_id}, name={name}")]
    EnvironmentNotFound { user_id: String, name: String },

    #[error("Feature flag not found: env_name={env_name}, feature_name={feature_name}")]
    FeatureFlagNotFound {
        env_name: String,
        feature_name: String,
    },

    #[error("API key not found in environment: {env_name}")]
    ApiKeyNotFound { env_name: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Repository error: {source}")]
    Repository {
        #[from]
        source: RepositoryError,
    },
}

/// Repository-level errors for data access operations.
///
/// Every failure raised by a [`TableStore`](crate::repositories::TableStore) is
/// normalized into one of these variants before it leaves the repository layer.
/// Absent items are never an error: reads return `Option`.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Store unavailable during {operation} on {table}: {source}")]
    StoreUnavailable {
        operation: &'static str,
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("Serialization error for {entity}: {message}")]
    Serialization {
        entity: &'static str,
        message: String,
    },

    #[error("DynamoDB table not found: {table_name}. Ensure the table exists and IAM permissions are correct.")]
    TableNotFound { table_name: String },

    #[error("Invalid query parameters: {message}")]
    InvalidQuery { message: String },

    #[error("Invalid pagination cursor: {message}")]
    InvalidCursor { message: String },
}

impl RepositoryError {
    /// Whether the caller may retry the same call. Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::StoreUnavailable { .. })
    }
}

/// Raw failures reported by a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("resource not found: {table_name}")]
    ResourceNotFound { table_name: String },

    #[error("request throttled: {message}")]
    Throttled {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("request rejected: {message}")]
    Validation { message: String },

    #[error("service error: {message}")]
    Service {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

/// Validation errors for input data
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredField { field: String },

    #[error("Invalid field value: {field}={value}, reason={reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Field too long: {field}, max_length={max_length}, actual_length={actual_length}")]
    TooLong {
        field: String,
        max_length: usize,
        actual_length: usize,
    },

    #[error("Invalid format: {field}, expected={expected}")]
    InvalidFormat { field: String, expected: String },
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::ValidationError {
            message: err.to_string(),
        }
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type alias for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result type alias for store backends
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;
