use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::RequestId;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{error, Instrument};

use super::condition::QueryExpression;
use super::schema::Item;
use super::store::{ItemPage, QueryRequest, ScanRequest, TableStore};
use crate::models::{StoreError, StoreResult};

/// [`TableStore`] backed by Amazon DynamoDB
pub struct DynamoDbStore {
    client: Arc<DynamoDbClient>,
    region: String,
}

impl DynamoDbStore {
    pub fn new(client: Arc<DynamoDbClient>, region: String) -> Self {
        Self { client, region }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Create a DynamoDB subsegment span with X-Ray and OpenTelemetry attributes
    fn create_dynamodb_span(&self, operation: &str, table_name: &str) -> tracing::Span {
        tracing::info_span!(
            "DynamoDB",
            "aws.service" = "DynamoDB",
            "aws.operation" = operation,
            "aws.region" = %self.region,
            "aws.dynamodb.table_name" = %table_name,
            "aws.request_id" = tracing::field::Empty,

            "aws.remote.service" = "AWS::DynamoDB",
            "aws.remote.operation" = operation,
            "aws.remote.resource.type" = "AWS::DynamoDB::Table",
            "aws.remote.resource.identifier" = %table_name,

            "otel.kind" = "client",
            "otel.name" = format!("DynamoDB.{}", operation),

            "rpc.system" = "aws-api",
            "rpc.service" = "AmazonDynamoDBv2",
            "rpc.method" = operation,

            "http.status_code" = tracing::field::Empty,

            "db.system" = "dynamodb",
            "db.name" = %table_name,
            "db.operation" = operation,
        )
    }
}

fn record_outcome<T: RequestId, E: std::fmt::Display>(operation: &str, result: &Result<T, E>) {
    match result {
        Ok(output) => {
            tracing::Span::current().record("http.status_code", 200);
            if let Some(request_id) = output.request_id() {
                tracing::Span::current().record("aws.request_id", request_id);
            }
        }
        Err(e) => {
            tracing::Span::current().record("http.status_code", 400);
            error!("DynamoDB {} failed: {}", operation, e);
        }
    }
}

/// Classify an SDK failure by its service error code.
///
/// Throttling and server-side faults are transient; `ValidationException`
/// means the request itself was wrong.
fn classify_sdk_error<E, R>(table_name: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    let code = err
        .as_service_error()
        .and_then(|service_error| service_error.code())
        .map(str::to_string);

    match code.as_deref() {
        Some("ResourceNotFoundException") => StoreError::ResourceNotFound {
            table_name: table_name.to_string(),
        },
        Some(
            "ProvisionedThroughputExceededException"
            | "RequestLimitExceeded"
            | "ThrottlingException",
        ) => StoreError::Throttled {
            message,
            source: Some(Box::new(err)),
        },
        Some("ValidationException") => StoreError::Validation { message },
        _ => match err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => StoreError::Transport {
                message,
                source: Some(Box::new(err)),
            },
            err => StoreError::Service {
                message,
                source: Some(Box::new(err)),
            },
        },
    }
}

fn limit(limit: Option<u32>) -> Option<i32> {
    limit.map(|l| i32::try_from(l).unwrap_or(i32::MAX))
}

#[async_trait]
impl TableStore for DynamoDbStore {
    async fn put_item(&self, table_name: &str, item: Item) -> StoreResult<()> {
        let span = self.create_dynamodb_span("PutItem", table_name);

        async {
            let result = self
                .client
                .put_item()
                .table_name(table_name)
                .set_item(Some(item))
                .send()
                .await;
            record_outcome("PutItem", &result);
            result
                .map(|_| ())
                .map_err(|e| classify_sdk_error(table_name, e))
        }
        .instrument(span)
        .await
    }

    async fn get_item(&self, table_name: &str, key: Item) -> StoreResult<Option<Item>> {
        let span = self.create_dynamodb_span("GetItem", table_name);

        async {
            let result = self
                .client
                .get_item()
                .table_name(table_name)
                .set_key(Some(key))
                .consistent_read(true)
                .send()
                .await;
            record_outcome("GetItem", &result);
            result
                .map(|output| output.item)
                .map_err(|e| classify_sdk_error(table_name, e))
        }
        .instrument(span)
        .await
    }

    async fn delete_item(&self, table_name: &str, key: Item) -> StoreResult<()> {
        let span = self.create_dynamodb_span("DeleteItem", table_name);

        async {
            let result = self
                .client
                .delete_item()
                .table_name(table_name)
                .set_key(Some(key))
                .send()
                .await;
            record_outcome("DeleteItem", &result);
            result
                .map(|_| ())
                .map_err(|e| classify_sdk_error(table_name, e))
        }
        .instrument(span)
        .await
    }

    async fn query(&self, request: QueryRequest) -> StoreResult<ItemPage> {
        let span = self.create_dynamodb_span("Query", &request.table_name);
        let expression =
            QueryExpression::render(&request.key, &request.condition, request.filter.as_ref());
        // Global secondary indexes only serve eventually consistent reads
        let consistent_read = request.index_name.is_none();

        async {
            let result = self
                .client
                .query()
                .table_name(&request.table_name)
                .set_index_name(request.index_name.clone())
                .key_condition_expression(expression.key_condition)
                .set_filter_expression(expression.filter)
                .set_expression_attribute_names(Some(expression.names))
                .set_expression_attribute_values(Some(expression.values))
                .set_limit(limit(request.limit))
                .set_exclusive_start_key(request.exclusive_start_key.clone())
                .consistent_read(consistent_read)
                .send()
                .await;
            record_outcome("Query", &result);
            result
                .map(|output| ItemPage {
                    items: output.items.unwrap_or_default(),
                    last_evaluated_key: output.last_evaluated_key,
                })
                .map_err(|e| classify_sdk_error(&request.table_name, e))
        }
        .instrument(span)
        .await
    }

    async fn scan(&self, request: ScanRequest) -> StoreResult<ItemPage> {
        let span = self.create_dynamodb_span("Scan", &request.table_name);

        async {
            let result = self
                .client
                .scan()
                .table_name(&request.table_name)
                .set_limit(limit(request.limit))
                .set_exclusive_start_key(request.exclusive_start_key.clone())
                .consistent_read(true)
                .send()
                .await;
            record_outcome("Scan", &result);
            result
                .map(|output| ItemPage {
                    items: output.items.unwrap_or_default(),
                    last_evaluated_key: output.last_evaluated_key,
                })
                .map_err(|e| classify_sdk_error(&request.table_name, e))
        }
        .instrument(span)
        .await
    }
}
