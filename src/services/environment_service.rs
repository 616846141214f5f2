use std::future::Future;
use std::sync::Arc;
use tracing::instrument;

use crate::models::{
    CreateEnvironmentRequest, Environment, ServiceError, ServiceResult, Validate,
};
use crate::observability::BusinessTracingMiddleware;
use crate::repositories::EnvironmentRepository;

const ENTITY: &str = "Environment";

/// Service for managing an owner's environments
pub struct EnvironmentService {
    repository: Arc<dyn EnvironmentRepository>,
    tracer: Option<BusinessTracingMiddleware>,
}

impl EnvironmentService {
    pub fn new(repository: Arc<dyn EnvironmentRepository>) -> Self {
        Self {
            repository,
            tracer: None,
        }
    }

    /// Count create and delete calls in `flag_operations_total`
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

    #[instrument(skip(self, request), fields(user_id = %user_id, name = %request.name))]
    pub async fn create_environment(
        &self,
        user_id: &str,
        request: CreateEnvironmentRequest,
    ) -> ServiceResult<Environment> {
        self.observe("create", async {
            crate::info_with_trace!("Creating environment");

            request.validate()?;
            let environment = Environment::from_request(user_id, request);

            Ok::<_, ServiceError>(self.repository.save(environment).await?)
        })
        .await
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_environments(&self, user_id: &str) -> ServiceResult<Vec<Environment>> {
        let environments = self.repository.list_for_user(user_id).await?;
        crate::info_with_trace!("Found {} environments", environments.len());
        Ok(environments)
    }

    #[instrument(skip(self), fields(user_id = %user_id, name = %name))]
    pub async fn get_environment(&self, user_id: &str, name: &str) -> ServiceResult<Environment> {
        let name = name.trim();

        match self.repository.get_by_name(user_id, name).await? {
            Some(environment) => Ok(environment),
            None => {
                crate::warn_with_trace!("Environment not found");
                Err(ServiceError::EnvironmentNotFound {
                    user_id: user_id.to_string(),
                    name: name.to_string(),
                })
            }
        }
    }

    /// Deleting an environment that does not exist succeeds. Flags and keys of
    /// the environment are left in place.
    #[instrument(skip(self), fields(user_id = %user_id, name = %name))]
    pub async fn delete_environment(&self, user_id: &str, name: &str) -> ServiceResult<()> {
        let name = name.trim();

        self.observe("delete", async {
            self.repository.delete(user_id, name).await?;
            crate::info_with_trace!("Environment deleted");
            Ok::<_, ServiceError>(())
        })
        .await
    }
}
