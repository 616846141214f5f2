use std::future::Future;
use std::sync::Arc;
use tracing::instrument;

use crate::models::{
    validate_name, FeatureFlag, FeatureFlagRequest, ServiceError, ServiceResult, Validate,
};
use crate::observability::BusinessTracingMiddleware;
use crate::repositories::{Cursor, FeatureFlagRepository, Page};

const ENTITY: &str = "FeatureFlag";

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Service for managing feature flags on behalf of their owner
pub struct FeatureFlagService {
    repository: Arc<dyn FeatureFlagRepository>,
    tracer: Option<BusinessTracingMiddleware>,
}

impl FeatureFlagService {
    pub fn new(repository: Arc<dyn FeatureFlagRepository>) -> Self {
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

    /// Create or fully replace one of the caller's flags. A flag owned by
    /// another user is left alone and reported as not found.
    #[instrument(skip(self, request), fields(
        user_id = %user_id,
        env_name = %request.env_name,
        feature_name = %request.feature_name,
    ))]
    pub async fn create_feature_flag(
        &self,
        user_id: &str,
        request: FeatureFlagRequest,
    ) -> ServiceResult<FeatureFlag> {
        self.observe("create", async {
            crate::info_with_trace!(flag_type = %request.flag_type, "Creating feature flag");

            request.validate()?;
            let flag = FeatureFlag::from_request(user_id, request);

            if let Some(existing) = self
                .repository
                .get_by_name(&flag.env_name, &flag.feature_name)
                .await?
            {
                if existing.user_id != user_id {
                    crate::warn_with_trace!("Refusing to replace a flag owned by another user");
                    return Err(ServiceError::FeatureFlagNotFound {
                        env_name: flag.env_name,
                        feature_name: flag.feature_name,
                    });
                }
            }

            Ok::<_, ServiceError>(self.repository.save(flag).await?)
        })
        .await
    }

    /// The caller's flags in one environment, read from the owner index
    #[instrument(skip(self), fields(user_id = %user_id, env_name = %env_name))]
    pub async fn list_feature_flags(
        &self,
        user_id: &str,
        env_name: &str,
    ) -> ServiceResult<Vec<FeatureFlag>> {
        validate_name("envName", env_name)?;
        let env_name = env_name.trim();

        let flags = self
            .repository
            .list_by_environment_for_user(env_name, user_id)
            .await?;

        crate::info_with_trace!("Found {} feature flags", flags.len());
        Ok(flags)
    }

    /// One page of the caller's flags in an environment.
    ///
    /// A page may hold fewer than `page_size` flags, or none at all, while a
    /// cursor is still returned; only a missing cursor marks the end.
    #[instrument(skip(self, cursor), fields(user_id = %user_id, env_name = %env_name))]
    pub async fn list_feature_flags_page(
        &self,
        user_id: &str,
        env_name: &str,
        page_size: Option<u32>,
        cursor: Option<&str>,
    ) -> ServiceResult<Page<FeatureFlag>> {
        validate_name("envName", env_name)?;
        let env_name = env_name.trim();

        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(ServiceError::ValidationError {
                message: format!("pageSize must be between 1 and {}", MAX_PAGE_SIZE),
            });
        }

        let cursor = cursor.map(Cursor::decode).transpose()?;

        Ok(self
            .repository
            .list_by_environment_for_user_page(env_name, user_id, page_size, cursor)
            .await?)
    }

    /// Flags owned by someone else are reported as not found
    #[instrument(skip(self), fields(user_id = %user_id, env_name = %env_name, feature_name = %feature_name))]
    pub async fn get_feature_flag(
        &self,
        user_id: &str,
        env_name: &str,
        feature_name: &str,
    ) -> ServiceResult<FeatureFlag> {
        let (env_name, feature_name) = (env_name.trim(), feature_name.trim());

        match self.repository.get_by_name(env_name, feature_name).await? {
            Some(flag) if flag.user_id == user_id => Ok(flag),
            _ => {
                crate::warn_with_trace!("Feature flag not found");
                Err(ServiceError::FeatureFlagNotFound {
                    env_name: env_name.to_string(),
                    feature_name: feature_name.to_string(),
                })
            }
        }
    }

    /// Idempotent: deleting an absent flag succeeds. A flag owned by another
    /// user is left alone and reported as not found.
    #[instrument(skip(self), fields(user_id = %user_id, env_name = %env_name, feature_name = %feature_name))]
    pub async fn delete_feature_flag(
        &self,
        user_id: &str,
        env_name: &str,
        feature_name: &str,
    ) -> ServiceResult<()> {
        let (env_name, feature_name) = (env_name.trim(), feature_name.trim());

        self.observe("delete", async {
            if let Some(flag) = self.repository.get_by_name(env_name, feature_name).await? {
                if flag.user_id != user_id {
                    crate::warn_with_trace!("Refusing to delete a flag owned by another user");
                    return Err(ServiceError::FeatureFlagNotFound {
                        env_name: env_name.to_string(),
                        feature_name: feature_name.to_string(),
                    });
                }
            }

            self.repository.delete(env_name, feature_name).await?;
            crate::info_with_trace!("Feature flag deleted");
            Ok::<_, ServiceError>(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RepositoryError, RepositoryResult};
    use async_trait::async_trait;
    use mockall::{mock, predicate::eq};

    mock! {
        TestFeatureFlagRepository {}

        #[async_trait]
        impl FeatureFlagRepository for TestFeatureFlagRepository {
            async fn save(&self, flag: FeatureFlag) -> RepositoryResult<FeatureFlag>;
            async fn get_by_name(&self, env_name: &str, feature_name: &str) -> RepositoryResult<Option<FeatureFlag>>;
            async fn list_by_environment(&self, env_name: &str) -> RepositoryResult<Vec<FeatureFlag>>;
            async fn list_by_environment_page(
                &self,
                env_name: &str,
                page_size: u32,
                cursor: Option<Cursor>,
            ) -> RepositoryResult<Page<FeatureFlag>>;
            async fn list_by_environment_for_user(&self, env_name: &str, user_id: &str) -> RepositoryResult<Vec<FeatureFlag>>;
            async fn list_by_environment_for_user_page(
                &self,
                env_name: &str,
                user_id: &str,
                page_size: u32,
                cursor: Option<Cursor>,
            ) -> RepositoryResult<Page<FeatureFlag>>;
            async fn list_for_user(&self, user_id: &str) -> RepositoryResult<Vec<FeatureFlag>>;
            async fn delete(&self, env_name: &str, feature_name: &str) -> RepositoryResult<()>;
        }
    }

    fn dark_mode(user_id: &str) -> FeatureFlag {
        FeatureFlag::new("prod", "dark-mode", "BOOLEAN", user_id).with_config(r#"{"enabled":true}"#)
    }

    fn request() -> FeatureFlagRequest {
        FeatureFlagRequest {
            env_name: "prod".to_string(),
            flag_type: "BOOLEAN".to_string(),
            feature_name: "dark-mode".to_string(),
            config: Some(r#"{"enabled":true}"#.to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_feature_flag_sets_owner() {
        let mut mock_repo = MockTestFeatureFlagRepository::new();
        mock_repo
            .expect_get_by_name()
            .with(eq("prod"), eq("dark-mode"))
            .returning(|_, _| Ok(None));
        mock_repo.expect_save().times(1).returning(Ok);

        let service = FeatureFlagService::new(Arc::new(mock_repo));
        let flag = service.create_feature_flag("u1", request()).await.unwrap();

        assert_eq!(flag, dark_mode("u1"));
    }

    #[tokio::test]
    async fn test_create_feature_flag_replaces_own_flag() {
        let mut mock_repo = MockTestFeatureFlagRepository::new();
        mock_repo
            .expect_get_by_name()
            .returning(|_, _| Ok(Some(dark_mode("u1").with_config(r#"{"enabled":false}"#))));
        mock_repo.expect_save().times(1).returning(Ok);

        let service = FeatureFlagService::new(Arc::new(mock_repo));
        let flag = service.create_feature_flag("u1", request()).await.unwrap();

        assert_eq!(flag.config.as_deref(), Some(r#"{"enabled":true}"#));
    }

    #[tokio::test]
    async fn test_create_feature_flag_of_other_owner_is_refused() {
        let mut mock_repo = MockTestFeatureFlagRepository::new();
        mock_repo
            .expect_get_by_name()
            .with(eq("prod"), eq("dark-mode"))
            .returning(|_, _| Ok(Some(dark_mode("u1"))));
        mock_repo.expect_save().never();

        let service = FeatureFlagService::new(Arc::new(mock_repo));
        let result = service.create_feature_flag("u2", request()).await;

        assert!(matches!(
            result,
            Err(ServiceError::FeatureFlagNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_feature_flag_rejects_invalid_config() {
        let mut mock_repo = MockTestFeatureFlagRepository::new();
        mock_repo.expect_save().never();

        let service = FeatureFlagService::new(Arc::new(mock_repo));
        let mut request = request();
        request.config = Some("{not json".to_string());

        let result = service.create_feature_flag("u1", request).await;
        assert!(matches!(result, Err(ServiceError::ValidationError { .. })));
    }

    #[tokio::test]
    async fn test_create_feature_flag_requires_type() {
        let service = FeatureFlagService::new(Arc::new(MockTestFeatureFlagRepository::new()));
        let mut request = request();
        request.flag_type = " ".to_string();

        match service.create_feature_flag("u1", request).await.unwrap_err() {
            ServiceError::ValidationError { message } => assert!(message.contains("type")),
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_feature_flags_uses_owner_index() {
        let mut mock_repo = MockTestFeatureFlagRepository::new();
        mock_repo
            .expect_list_by_environment_for_user()
            .with(eq("prod"), eq("u1"))
            .times(1)
            .returning(|_, _| Ok(vec![dark_mode("u1")]));
        mock_repo.expect_list_by_environment().never();

        let service = FeatureFlagService::new(Arc::new(mock_repo));
        let flags = service.list_feature_flags("u1", "prod").await.unwrap();

        assert_eq!(flags.len(), 1);
    }

    #[tokio::test]
    async fn test_env_name_is_trimmed_before_lookup() {
        let mut mock_repo = MockTestFeatureFlagRepository::new();
        mock_repo
            .expect_list_by_environment_for_user()
            .with(eq("prod"), eq("u1"))
            .times(1)
            .returning(|_, _| Ok(vec![dark_mode("u1")]));
        mock_repo
            .expect_get_by_name()
            .with(eq("prod"), eq("dark-mode"))
            .returning(|_, _| Ok(Some(dark_mode("u1"))));
        mock_repo
            .expect_delete()
            .with(eq("prod"), eq("dark-mode"))
            .times(1)
            .returning(|_, _| Ok(()));

        let service = FeatureFlagService::new(Arc::new(mock_repo));

        assert_eq!(service.list_feature_flags("u1", " prod ").await.unwrap().len(), 1);
        assert!(service.get_feature_flag("u1", " prod", "dark-mode ").await.is_ok());
        assert!(service.delete_feature_flag("u1", "prod ", " dark-mode").await.is_ok());
    }

    #[tokio::test]
    async fn test_get_feature_flag_hides_other_owners() {
        let mut mock_repo = MockTestFeatureFlagRepository::new();
        mock_repo
            .expect_get_by_name()
            .with(eq("prod"), eq("dark-mode"))
            .returning(|_, _| Ok(Some(dark_mode("u2"))));

        let service = FeatureFlagService::new(Arc::new(mock_repo));

        assert!(matches!(
            service.get_feature_flag("u1", "prod", "dark-mode").await,
            Err(ServiceError::FeatureFlagNotFound { .. })
        ));
        assert_eq!(
            service
                .get_feature_flag("u2", "prod", "dark-mode")
                .await
                .unwrap(),
            dark_mode("u2")
        );
    }

    #[tokio::test]
    async fn test_delete_absent_feature_flag_succeeds() {
        let mut mock_repo = MockTestFeatureFlagRepository::new();
        mock_repo.expect_get_by_name().returning(|_, _| Ok(None));
        mock_repo
            .expect_delete()
            .with(eq("prod"), eq("gone"))
            .times(1)
            .returning(|_, _| Ok(()));

        let service = FeatureFlagService::new(Arc::new(mock_repo));
        assert!(service.delete_feature_flag("u1", "prod", "gone").await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_feature_flag_of_other_owner_is_refused() {
        let mut mock_repo = MockTestFeatureFlagRepository::new();
        mock_repo
            .expect_get_by_name()
            .returning(|_, _| Ok(Some(dark_mode("u2"))));
        mock_repo.expect_delete().never();

        let service = FeatureFlagService::new(Arc::new(mock_repo));
        let result = service.delete_feature_flag("u1", "prod", "dark-mode").await;

        assert!(matches!(
            result,
            Err(ServiceError::FeatureFlagNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_page_rejects_bad_page_size_and_cursor() {
        let mut mock_repo = MockTestFeatureFlagRepository::new();
        mock_repo.expect_list_by_environment_for_user_page().never();

        let service = FeatureFlagService::new(Arc::new(mock_repo));

        assert!(matches!(
            service
                .list_feature_flags_page("u1", "prod", Some(0), None)
                .await,
            Err(ServiceError::ValidationError { .. })
        ));
        assert!(matches!(
            service
                .list_feature_flags_page("u1", "prod", Some(MAX_PAGE_SIZE + 1), None)
                .await,
            Err(ServiceError::ValidationError { .. })
        ));
        assert!(matches!(
            service
                .list_feature_flags_page("u1", "prod", None, Some("%%%"))
                .await,
            Err(ServiceError::Repository {
                source: RepositoryError::InvalidCursor { .. }
            })
        ));
    }

    #[tokio::test]
    async fn test_list_page_defaults_page_size() {
        let mut mock_repo = MockTestFeatureFlagRepository::new();
        mock_repo
            .expect_list_by_environment_for_user_page()
            .withf(|env, user, size, cursor| {
                env == "prod" && user == "u1" && *size == DEFAULT_PAGE_SIZE && cursor.is_none()
            })
            .times(1)
            .returning(|_, _, _, _| {
                Ok(Page {
                    items: vec![dark_mode("u1")],
                    next_cursor: None,
                })
            });

        let service = FeatureFlagService::new(Arc::new(mock_repo));
        let page = service
            .list_feature_flags_page("u1", "prod", None, None)
            .await
            .unwrap();

        assert!(page.is_last());
        assert_eq!(page.items.len(), 1);
    }
}
