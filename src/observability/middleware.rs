use async_trait::async_trait;
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use opentelemetry::trace::TraceContextExt;
use std::{sync::Arc, time::Instant};
use tracing::{error, info, instrument, warn, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::Metrics;
use crate::models::StoreResult;
use crate::repositories::{Item, ItemPage, QueryRequest, ScanRequest, TableStore};

/// Keeps `http_requests_in_flight` balanced when the request future is
/// dropped before a response is produced (client disconnect, outer timeout).
struct InFlightGuard {
    metrics: Arc<Metrics>,
    method: String,
    endpoint: String,
    completed: bool,
}

impl InFlightGuard {
    fn start(metrics: Arc<Metrics>, method: &str, endpoint: &str) -> Self {
        metrics.increment_in_flight(method, endpoint);
        Self {
            metrics,
            method: method.to_string(),
            endpoint: endpoint.to_string(),
            completed: false,
        }
    }

    fn complete(mut self, status_code: u16, duration_secs: f64) {
        self.metrics
            .record_http_request(&self.method, &self.endpoint, status_code, duration_secs);
        self.completed = true;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.decrement_in_flight(&self.method, &self.endpoint);
        if !self.completed {
            warn!(method = %self.method, path = %self.endpoint, "Request dropped before completion");
        }
    }
}

/// Middleware for automatic request tracing and metrics collection
pub async fn observability_middleware(
    metrics: Arc<Metrics>,
    request: Request,
    next: Next,
) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let uri = request.uri().to_string();

    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    // First hop of X-Forwarded-For, then X-Real-IP
    let client_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .or_else(|| {
            request
                .headers()
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
        })
        .unwrap_or("unknown")
        .trim()
        .to_string();

    // Route template keeps label cardinality bounded
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched_path| matched_path.as_str().to_string())
        .unwrap_or_else(|| uri.clone());

    let span_name = format!("{} {}", method, endpoint);

    let span = tracing::info_span!(
        target: "featureflag_rs::http",
        "{}", span_name,
        otel.name = %span_name,
        otel.kind = "server",
        http.method = %method,
        http.route = %endpoint,
        http.url = %uri,
        http.user_agent = %user_agent,
        client.address = %client_ip,
        http.status_code = tracing::field::Empty,
        http.response_time_ms = tracing::field::Empty,
    );

    async {
        let in_flight = InFlightGuard::start(metrics, &method, &endpoint);

        let trace_id = tracing::Span::current()
            .context()
            .span()
            .span_context()
            .trace_id()
            .to_string();

        info!(trace_id = %trace_id, method = %method, path = %endpoint, client_ip = %client_ip, "Processing request");

        let response = next.run(request).await;

        let duration = start_time.elapsed();
        let duration_ms = duration.as_millis();
        let status_code = response.status().as_u16();

        let current_span = tracing::Span::current();
        current_span.record("http.status_code", status_code);
        current_span.record("http.response_time_ms", duration_ms);

        let span_context = current_span.context();
        let otel_span = span_context.span();
        if status_code >= 500 {
            otel_span.set_status(opentelemetry::trace::Status::error("HTTP server error"));
        } else {
            otel_span.set_status(opentelemetry::trace::Status::Ok);
        }

        in_flight.complete(status_code, duration.as_secs_f64());

        if status_code >= 500 {
            error!(
                trace_id = %trace_id,
                method = %method,
                path = %endpoint,
                status_code = status_code,
                duration_ms = duration_ms,
                "Request failed"
            );
        } else {
            info!(
                trace_id = %trace_id,
                method = %method,
                path = %endpoint,
                status_code = status_code,
                duration_ms = duration_ms,
                "Request completed"
            );
        }

        response
    }
    .instrument(span)
    .await
}

/// Times store calls and records them as `store_operations_total`
#[derive(Clone)]
pub struct DatabaseTracingMiddleware {
    metrics: Arc<Metrics>,
}

impl DatabaseTracingMiddleware {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    /// Trace a store operation with automatic metrics recording
    #[instrument(skip_all, fields(
        operation = %operation,
        table = %table,
    ))]
    pub async fn trace_operation<F, T, E>(
        &self,
        operation: &str,
        table: &str,
        future: F,
    ) -> Result<T, E>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let start_time = Instant::now();

        match future.await {
            Ok(result) => {
                self.metrics.record_store_operation(
                    operation,
                    table,
                    true,
                    start_time.elapsed().as_secs_f64(),
                );

                info!(
                    duration_ms = start_time.elapsed().as_millis(),
                    "Store operation completed"
                );

                Ok(result)
            }
            Err(error) => {
                self.metrics.record_store_operation(
                    operation,
                    table,
                    false,
                    start_time.elapsed().as_secs_f64(),
                );

                error!(
                    error = %error,
                    duration_ms = start_time.elapsed().as_millis(),
                    "Store operation failed"
                );

                Err(error)
            }
        }
    }
}

/// [`TableStore`] decorator that traces and meters every call to the wrapped store
pub struct TracedStore {
    inner: Arc<dyn TableStore>,
    tracer: DatabaseTracingMiddleware,
}

impl TracedStore {
    pub fn new(inner: Arc<dyn TableStore>, metrics: Arc<Metrics>) -> Self {
        Self {
            inner,
            tracer: DatabaseTracingMiddleware::new(metrics),
        }
    }
}

#[async_trait]
impl TableStore for TracedStore {
    async fn put_item(&self, table_name: &str, item: Item) -> StoreResult<()> {
        self.tracer
            .trace_operation("put_item", table_name, self.inner.put_item(table_name, item))
            .await
    }

    async fn get_item(&self, table_name: &str, key: Item) -> StoreResult<Option<Item>> {
        self.tracer
            .trace_operation("get_item", table_name, self.inner.get_item(table_name, key))
            .await
    }

    async fn delete_item(&self, table_name: &str, key: Item) -> StoreResult<()> {
        self.tracer
            .trace_operation(
                "delete_item",
                table_name,
                self.inner.delete_item(table_name, key),
            )
            .await
    }

    async fn query(&self, request: QueryRequest) -> StoreResult<ItemPage> {
        let table_name = request.table_name.clone();
        self.tracer
            .trace_operation("query", &table_name, self.inner.query(request))
            .await
    }

    async fn scan(&self, request: ScanRequest) -> StoreResult<ItemPage> {
        let table_name = request.table_name.clone();
        self.tracer
            .trace_operation("scan", &table_name, self.inner.scan(request))
            .await
    }
}

/// Wraps service operations with a span and the `flag_operations_total` counter
#[derive(Clone)]
pub struct BusinessTracingMiddleware {
    metrics: Arc<Metrics>,
}

impl BusinessTracingMiddleware {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    #[instrument(skip_all, fields(
        operation = %operation,
        entity = %entity,
    ))]
    pub async fn trace_entity_operation<F, T, E>(
        &self,
        operation: &str,
        entity: &str,
        future: F,
    ) -> Result<T, E>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let start_time = Instant::now();

        match future.await {
            Ok(result) => {
                self.metrics.record_entity_operation(operation, entity, true);
                info!(
                    duration_ms = start_time.elapsed().as_millis(),
                    "Operation completed"
                );
                Ok(result)
            }
            Err(error) => {
                self.metrics.record_entity_operation(operation, entity, false);
                error!(
                    error = %error,
                    duration_ms = start_time.elapsed().as_millis(),
                    "Operation failed"
                );
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{InMemoryStore, Key, TableNames, FEATURE_FLAG_TABLE};
    use aws_sdk_dynamodb::types::AttributeValue;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    async fn test_handler() -> &'static str {
        "test response"
    }

    async fn error_handler() -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    async fn stalled_handler() -> &'static str {
        std::future::pending::<()>().await;
        "unreachable"
    }

    fn app_with(metrics: Arc<Metrics>) -> Router {
        Router::new()
            .route("/test/:name", get(test_handler))
            .route("/error", get(error_handler))
            .route("/stalled", get(stalled_handler))
            .layer(middleware::from_fn(move |req, next| {
                observability_middleware(metrics.clone(), req, next)
            }))
    }

    #[tokio::test]
    async fn test_observability_middleware_records_route_template() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let app = app_with(metrics.clone());

        let request = Request::builder()
            .method(Method::GET)
            .uri("/test/prod")
            .header("user-agent", "test-client/1.0")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(
            metrics
                .http_requests_total
                .with_label_values(&["GET", "/test/:name", "200"])
                .get(),
            1.0
        );
        assert_eq!(
            metrics
                .http_requests_in_flight
                .with_label_values(&["GET", "/test/:name"])
                .get(),
            0.0
        );
    }

    #[tokio::test]
    async fn test_observability_middleware_error() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let app = app_with(metrics.clone());

        let request = Request::builder()
            .method(Method::GET)
            .uri("/error")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            metrics
                .http_requests_total
                .with_label_values(&["GET", "/error", "500"])
                .get(),
            1.0
        );
    }

    #[tokio::test]
    async fn test_dropped_request_leaves_no_request_in_flight() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let app = app_with(metrics.clone());

        let request = Request::builder()
            .method(Method::GET)
            .uri("/stalled")
            .body(Body::empty())
            .unwrap();

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(20), app.oneshot(request)).await;
        assert!(result.is_err());

        assert_eq!(
            metrics
                .http_requests_in_flight
                .with_label_values(&["GET", "/stalled"])
                .get(),
            0.0
        );
    }

    #[tokio::test]
    async fn test_database_tracing_middleware() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let middleware = DatabaseTracingMiddleware::new(metrics.clone());

        let result = middleware
            .trace_operation("get_item", "test_table", async {
                Ok::<_, String>("success")
            })
            .await;
        assert!(result.is_ok());

        let result = middleware
            .trace_operation("put_item", "test_table", async {
                Err::<String, _>("error")
            })
            .await;
        assert!(result.is_err());

        assert_eq!(
            metrics
                .store_operations_total
                .with_label_values(&["put_item", "test_table", "error"])
                .get(),
            1.0
        );
    }

    #[tokio::test]
    async fn test_traced_store_delegates_and_meters() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let inner = Arc::new(InMemoryStore::with_tables(&TableNames::default()));
        let store = TracedStore::new(inner.clone(), metrics.clone());

        let mut item = Key::new("prod", Some("dark-mode"))
            .to_item(&FEATURE_FLAG_TABLE.key)
            .unwrap();
        item.insert("type".to_string(), AttributeValue::S("boolean".to_string()));
        item.insert("userId".to_string(), AttributeValue::S("u1".to_string()));

        store.put_item("FeatureFlag", item.clone()).await.unwrap();
        assert_eq!(inner.item_count("FeatureFlag").await, 1);

        let key = Key::new("prod", Some("dark-mode"))
            .to_item(&FEATURE_FLAG_TABLE.key)
            .unwrap();
        let fetched = store.get_item("FeatureFlag", key).await.unwrap();
        assert_eq!(fetched, Some(item));

        // Unknown table surfaces the store error and is counted as a failure
        assert!(store
            .put_item("Missing", Item::new())
            .await
            .is_err());

        assert_eq!(
            metrics
                .store_operations_total
                .with_label_values(&["put_item", "FeatureFlag", "success"])
                .get(),
            1.0
        );
        assert_eq!(
            metrics
                .store_operations_total
                .with_label_values(&["get_item", "FeatureFlag", "success"])
                .get(),
            1.0
        );
        assert_eq!(
            metrics
                .store_operations_total
                .with_label_values(&["put_item", "Missing", "error"])
                .get(),
            1.0
        );
    }

    #[tokio::test]
    async fn test_business_tracing_middleware() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let middleware = BusinessTracingMiddleware::new(metrics.clone());

        let result = middleware
            .trace_entity_operation("create", "FeatureFlag", async {
                Ok::<_, String>("created")
            })
            .await;
        assert!(result.is_ok());

        let result = middleware
            .trace_entity_operation("delete", "ApiKey", async { Err::<(), _>("boom") })
            .await;
        assert!(result.is_err());

        assert_eq!(
            metrics
                .flag_operations_total
                .with_label_values(&["create", "FeatureFlag", "success"])
                .get(),
            1.0
        );
        assert_eq!(
            metrics
                .flag_operations_total
                .with_label_values(&["delete", "ApiKey", "error"])
                .get(),
            1.0
        );
    }
}
