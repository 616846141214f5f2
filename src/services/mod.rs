// Services module - business logic layer

pub mod api_key_service;
pub mod environment_service;
pub mod feature_flag_service;

pub use api_key_service::ApiKeyService;
pub use environment_service::EnvironmentService;
pub use feature_flag_service::{FeatureFlagService, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
