use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, instrument, warn};

use crate::models::{
    ApiKeyResponse, CreateEnvironmentRequest, Environment, FeatureFlagRequest,
    FeatureFlagResponse, GenerateApiKeyRequest, RepositoryError, ServiceError,
};
use crate::observability::{BusinessTracingMiddleware, Metrics};
use crate::repositories::{Page, Repositories};
use crate::services::{ApiKeyService, EnvironmentService, FeatureFlagService};

/// Header carrying the identity resolved by the upstream token resolver
pub const USER_ID_HEADER: &str = "x-user-id";

type ApiError = (StatusCode, Json<Value>);

/// Shared application state containing all services
#[derive(Clone)]
pub struct ApiState {
    pub environments: Arc<EnvironmentService>,
    pub feature_flags: Arc<FeatureFlagService>,
    pub api_keys: Arc<ApiKeyService>,
}

impl ApiState {
    /// Build the services over `repositories`, counting their writes in `metrics` when given
    pub fn new(repositories: Repositories, metrics: Option<Arc<Metrics>>) -> Self {
        let mut environments = EnvironmentService::new(repositories.environments);
        let mut feature_flags = FeatureFlagService::new(repositories.feature_flags);
        let mut api_keys = ApiKeyService::new(repositories.api_keys);

        if let Some(metrics) = metrics {
            let tracer = BusinessTracingMiddleware::new(metrics);
            environments = environments.with_tracer(tracer.clone());
            feature_flags = feature_flags.with_tracer(tracer.clone());
            api_keys = api_keys.with_tracer(tracer);
        }

        Self {
            environments: Arc::new(environments),
            feature_flags: Arc::new(feature_flags),
            api_keys: Arc::new(api_keys),
        }
    }
}

/// The caller, as resolved from the `x-user-id` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match user_id {
            Some(user_id) => Ok(AuthenticatedUser {
                user_id: user_id.to_string(),
            }),
            None => {
                warn!("Request without a resolved user identity");
                Err(error_response(
                    StatusCode::UNAUTHORIZED,
                    "Missing user identity".to_string(),
                ))
            }
        }
    }
}

/// Query parameters for listing flags of an environment
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagListQuery {
    pub env_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlagPageQuery {
    pub env_name: String,
    pub page_size: Option<u32>,
    pub cursor: Option<String>,
}

/// Create API router with all environment, flag and key endpoints
pub fn create_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/env", get(list_environments).post(create_environment))
        .route(
            "/env/:name",
            get(get_environment).delete(delete_environment),
        )
        .route("/env/ff", get(list_feature_flags).post(create_feature_flag))
        .route("/env/ff/page", get(list_feature_flags_page))
        .route(
            "/env/ff/:env_name/:feature_name",
            get(get_feature_flag).delete(delete_feature_flag),
        )
        .route("/env/key", post(generate_api_key))
        .route("/env/key/:env_name", get(list_api_keys))
        .route("/env/key/:env_name/:key", delete(delete_api_key))
        .with_state(state)
}

// =============================================================================
// ENVIRONMENT ENDPOINTS
// =============================================================================

#[instrument(name = "list_environments", skip(state, user), fields(user_id = %user.user_id))]
pub async fn list_environments(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Environment>>, ApiError> {
    state
        .environments
        .list_environments(&user.user_id)
        .await
        .map(Json)
        .map_err(service_error_to_response)
}

#[instrument(name = "create_environment", skip(state, user, request), fields(user_id = %user.user_id))]
pub async fn create_environment(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    Json(request): Json<CreateEnvironmentRequest>,
) -> Result<(StatusCode, Json<Environment>), ApiError> {
    match state
        .environments
        .create_environment(&user.user_id, request)
        .await
    {
        Ok(environment) => Ok((StatusCode::CREATED, Json(environment))),
        Err(err) => {
            error!("Failed to create environment: {}", err);
            Err(service_error_to_response(err))
        }
    }
}

#[instrument(name = "get_environment", skip(state, user), fields(user_id = %user.user_id))]
pub async fn get_environment(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    Path(name): Path<String>,
) -> Result<Json<Environment>, ApiError> {
    state
        .environments
        .get_environment(&user.user_id, &name)
        .await
        .map(Json)
        .map_err(service_error_to_response)
}

#[instrument(name = "delete_environment", skip(state, user), fields(user_id = %user.user_id))]
pub async fn delete_environment(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .environments
        .delete_environment(&user.user_id, &name)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(service_error_to_response)
}

// =============================================================================
// FEATURE FLAG ENDPOINTS
// =============================================================================

#[instrument(name = "create_feature_flag", skip(state, user, request), fields(
    user_id = %user.user_id,
    env_name = %request.env_name,
    feature_name = %request.feature_name,
))]
pub async fn create_feature_flag(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    Json(request): Json<FeatureFlagRequest>,
) -> Result<(StatusCode, Json<FeatureFlagResponse>), ApiError> {
    match state
        .feature_flags
        .create_feature_flag(&user.user_id, request)
        .await
    {
        Ok(flag) => Ok((StatusCode::CREATED, Json(flag.into()))),
        Err(err) => {
            error!("Failed to create feature flag: {}", err);
            Err(service_error_to_response(err))
        }
    }
}

#[instrument(name = "list_feature_flags", skip(state, user), fields(user_id = %user.user_id, env_name = %query.env_name))]
pub async fn list_feature_flags(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    Query(query): Query<FeatureFlagListQuery>,
) -> Result<Json<Vec<FeatureFlagResponse>>, ApiError> {
    let flags = state
        .feature_flags
        .list_feature_flags(&user.user_id, &query.env_name)
        .await
        .map_err(service_error_to_response)?;

    Ok(Json(flags.into_iter().map(Into::into).collect()))
}

#[instrument(name = "list_feature_flags_page", skip(state, user, query), fields(
    user_id = %user.user_id,
    env_name = %query.env_name,
    page_size = query.page_size,
))]
pub async fn list_feature_flags_page(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    Query(query): Query<FeatureFlagPageQuery>,
) -> Result<Json<Page<FeatureFlagResponse>>, ApiError> {
    let page = state
        .feature_flags
        .list_feature_flags_page(
            &user.user_id,
            &query.env_name,
            query.page_size,
            query.cursor.as_deref(),
        )
        .await
        .map_err(service_error_to_response)?;

    Ok(Json(page.map(Into::into)))
}

#[instrument(name = "get_feature_flag", skip(state, user), fields(user_id = %user.user_id))]
pub async fn get_feature_flag(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    Path((env_name, feature_name)): Path<(String, String)>,
) -> Result<Json<FeatureFlagResponse>, ApiError> {
    state
        .feature_flags
        .get_feature_flag(&user.user_id, &env_name, &feature_name)
        .await
        .map(|flag| Json(flag.into()))
        .map_err(service_error_to_response)
}

#[instrument(name = "delete_feature_flag", skip(state, user), fields(user_id = %user.user_id))]
pub async fn delete_feature_flag(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    Path((env_name, feature_name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .feature_flags
        .delete_feature_flag(&user.user_id, &env_name, &feature_name)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(service_error_to_response)
}

// =============================================================================
// API KEY ENDPOINTS
// =============================================================================

#[instrument(name = "generate_api_key", skip(state, user, request), fields(user_id = %user.user_id, env_name = %request.env))]
pub async fn generate_api_key(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    Json(request): Json<GenerateApiKeyRequest>,
) -> Result<(StatusCode, Json<ApiKeyResponse>), ApiError> {
    match state.api_keys.generate_api_key(&user.user_id, request).await {
        Ok(key) => Ok((StatusCode::CREATED, Json(key.into()))),
        Err(err) => {
            error!("Failed to generate API key: {}", err);
            Err(service_error_to_response(err))
        }
    }
}

#[instrument(name = "list_api_keys", skip(state, user), fields(user_id = %user.user_id))]
pub async fn list_api_keys(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    Path(env_name): Path<String>,
) -> Result<Json<Vec<ApiKeyResponse>>, ApiError> {
    let keys = state
        .api_keys
        .list_api_keys(&user.user_id, &env_name)
        .await
        .map_err(service_error_to_response)?;

    Ok(Json(keys.into_iter().map(Into::into).collect()))
}

#[instrument(name = "delete_api_key", skip(state, user, path), fields(user_id = %user.user_id))]
pub async fn delete_api_key(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    path: Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let Path((env_name, key)) = path;
    state
        .api_keys
        .delete_api_key(&user.user_id, &env_name, &key)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(service_error_to_response)
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

fn error_response(status: StatusCode, message: String) -> ApiError {
    (
        status,
        Json(json!({
            "error": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

/// Map service errors onto HTTP statuses. Store internals never reach the body.
pub fn service_error_to_response(err: ServiceError) -> ApiError {
    let (status, message) = match &err {
        ServiceError::EnvironmentNotFound { .. }
        | ServiceError::FeatureFlagNotFound { .. }
        | ServiceError::ApiKeyNotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        ServiceError::ValidationError { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        ServiceError::Repository { source } => match source {
            RepositoryError::InvalidCursor { .. } => (StatusCode::BAD_REQUEST, source.to_string()),
            RepositoryError::StoreUnavailable { .. } => {
                error!(error = %source, "Store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable".to_string(),
                )
            }
            RepositoryError::Serialization { .. }
            | RepositoryError::TableNotFound { .. }
            | RepositoryError::InvalidQuery { .. } => {
                error!(error = %source, "Repository failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        },
    };

    error_response(status, message)
}
