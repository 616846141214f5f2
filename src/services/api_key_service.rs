use std::future::Future;
use std::sync::Arc;
use tracing::instrument;

use crate::models::{
    validate_name, ApiKey, GenerateApiKeyRequest, ServiceError, ServiceResult, Validate,
};
use crate::observability::BusinessTracingMiddleware;
use crate::repositories::ApiKeyRepository;

const ENTITY: &str = "ApiKey";

/// Service issuing and revoking environment API keys
pub struct ApiKeyService {
    repository: Arc<dyn ApiKeyRepository>,
    tracer: Option<BusinessTracingMiddleware>,
}

impl ApiKeyService {
    pub fn new(repository: Arc<dyn ApiKeyRepository>) -> Self {
        Self {
            repository,
            tracer: None,
        }
    }

    pub fn with_tracer(mut self, tracer: BusinessTracingMiddleware) -> Self {
        self.tracer = Some(tracer);
        self
    }

    async fn observe<T, F>(&self, operation: &str, future: F) -> ServiceResult<T>
    where
        F: Future<Output = ServiceResult<T>>,
    {
        match &self.tracer {
            Some(tracer) => tracer.trace_entity_operation(operation, ENTITY, future).await,
            None => future.await,
        }
    }

    /// Issue a new active key for `request.env`, owned by the caller
    #[instrument(skip(self, request), fields(user_id = %user_id, env_name = %request.env))]
    pub async fn generate_api_key(
        &self,
        user_id: &str,
        request: GenerateApiKeyRequest,
    ) -> ServiceResult<ApiKey> {
        self.observe("generate", async {
            request.validate()?;

            let key = ApiKey::generate(request.env.trim(), user_id);
            let saved = self.repository.save(key).await?;

            crate::info_with_trace!("API key generated");
            Ok::<_, ServiceError>(saved)
        })
        .await
    }

    #[instrument(skip(self), fields(user_id = %user_id, env_name = %env_name))]
    pub async fn list_api_keys(&self, user_id: &str, env_name: &str) -> ServiceResult<Vec<ApiKey>> {
        validate_name("envName", env_name)?;
        let env_name = env_name.trim();

        let keys = self
            .repository
            .list_by_environment_for_user(env_name, user_id)
            .await?;

        crate::info_with_trace!("Found {} API keys", keys.len());
        Ok(keys)
    }

    #[instrument(skip(self, key), fields(user_id = %user_id, env_name = %env_name))]
    pub async fn get_api_key(
        &self,
        user_id: &str,
        env_name: &str,
        key: &str,
    ) -> ServiceResult<ApiKey> {
        let env_name = env_name.trim();

        match self.repository.get_key(env_name, key).await? {
            Some(api_key) if api_key.user_id == user_id => Ok(api_key),
            _ => Err(ServiceError::ApiKeyNotFound {
                env_name: env_name.to_string(),
            }),
        }
    }

    /// Revoking an absent key succeeds; a key owned by another user is not touched
    #[instrument(skip(self, key), fields(user_id = %user_id, env_name = %env_name))]
    pub async fn delete_api_key(&self, user_id: &str, env_name: &str, key: &str) -> ServiceResult<()> {
        let env_name = env_name.trim();

        self.observe("delete", async {
            if let Some(api_key) = self.repository.get_key(env_name, key).await? {
                if api_key.user_id != user_id {
                    crate::warn_with_trace!("Refusing to delete an API key owned by another user");
                    return Err(ServiceError::ApiKeyNotFound {
                        env_name: env_name.to_string(),
                    });
                }
            }

            self.repository.delete_key(env_name, key).await?;
            crate::info_with_trace!("API key deleted");
            Ok::<_, ServiceError>(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RepositoryResult;
    use async_trait::async_trait;
    use mockall::{mock, predicate::eq};

    mock! {
        TestApiKeyRepository {}

        #[async_trait]
        impl ApiKeyRepository for TestApiKeyRepository {
            async fn save(&self, key: ApiKey) -> RepositoryResult<ApiKey>;
            async fn list_by_environment(&self, env_name: &str) -> RepositoryResult<Vec<ApiKey>>;
            async fn list_by_environment_for_user(&self, env_name: &str, user_id: &str) -> RepositoryResult<Vec<ApiKey>>;
            async fn get_key(&self, env_name: &str, key: &str) -> RepositoryResult<Option<ApiKey>>;
            async fn delete_key(&self, env_name: &str, key: &str) -> RepositoryResult<()>;
        }
    }

    #[tokio::test]
    async fn test_generate_api_key() {
        let mut mock_repo = MockTestApiKeyRepository::new();
        mock_repo.expect_save().times(1).returning(Ok);

        let service = ApiKeyService::new(Arc::new(mock_repo));
        let key = service
            .generate_api_key(
                "u1",
                GenerateApiKeyRequest {
                    env: " staging ".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(key.env_name, "staging");
        assert_eq!(key.user_id, "u1");
        assert!(key.active);
        assert!(uuid::Uuid::parse_str(&key.key).is_ok());
    }

    #[tokio::test]
    async fn test_generate_api_key_requires_env() {
        let mut mock_repo = MockTestApiKeyRepository::new();
        mock_repo.expect_save().never();

        let service = ApiKeyService::new(Arc::new(mock_repo));
        let result = service
            .generate_api_key("u1", GenerateApiKeyRequest { env: String::new() })
            .await;

        assert!(matches!(result, Err(ServiceError::ValidationError { .. })));
    }

    #[tokio::test]
    async fn test_list_api_keys_filters_by_owner() {
        let mut mock_repo = MockTestApiKeyRepository::new();
        mock_repo
            .expect_list_by_environment_for_user()
            .with(eq("staging"), eq("u1"))
            .times(1)
            .returning(|_, _| Ok(vec![ApiKey::new("staging", "k1", "u1")]));
        mock_repo.expect_list_by_environment().never();

        let service = ApiKeyService::new(Arc::new(mock_repo));
        let keys = service.list_api_keys("u1", "staging").await.unwrap();

        assert_eq!(keys, vec![ApiKey::new("staging", "k1", "u1")]);
    }

    #[tokio::test]
    async fn test_env_name_is_trimmed_before_lookup() {
        let mut mock_repo = MockTestApiKeyRepository::new();
        mock_repo
            .expect_list_by_environment_for_user()
            .with(eq("staging"), eq("u1"))
            .times(1)
            .returning(|_, _| Ok(vec![ApiKey::new("staging", "k1", "u1")]));
        mock_repo
            .expect_get_key()
            .with(eq("staging"), eq("k1"))
            .returning(|_, _| Ok(Some(ApiKey::new("staging", "k1", "u1"))));
        mock_repo
            .expect_delete_key()
            .with(eq("staging"), eq("k1"))
            .times(1)
            .returning(|_, _| Ok(()));

        let service = ApiKeyService::new(Arc::new(mock_repo));

        assert_eq!(service.list_api_keys("u1", " staging ").await.unwrap().len(), 1);
        assert!(service.get_api_key("u1", "staging ", "k1").await.is_ok());
        assert!(service.delete_api_key("u1", " staging", "k1").await.is_ok());
    }

    #[tokio::test]
    async fn test_get_api_key_of_other_owner_is_not_found() {
        let mut mock_repo = MockTestApiKeyRepository::new();
        mock_repo
            .expect_get_key()
            .with(eq("staging"), eq("k1"))
            .returning(|_, _| Ok(Some(ApiKey::new("staging", "k1", "u2"))));

        let service = ApiKeyService::new(Arc::new(mock_repo));

        assert!(matches!(
            service.get_api_key("u1", "staging", "k1").await,
            Err(ServiceError::ApiKeyNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_api_key() {
        let mut mock_repo = MockTestApiKeyRepository::new();
        mock_repo
            .expect_get_key()
            .returning(|_, _| Ok(Some(ApiKey::new("staging", "k1", "u1"))));
        mock_repo
            .expect_delete_key()
            .with(eq("staging"), eq("k1"))
            .times(1)
            .returning(|_, _| Ok(()));

        let service = ApiKeyService::new(Arc::new(mock_repo));
        assert!(service.delete_api_key("u1", "staging", "k1").await.is_ok());
    }
}
