pub mod api;
pub mod health;
pub mod metrics;
pub mod middleware;

pub use api::*;
pub use health::*;
pub use metrics::*;
pub use middleware::*;

use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::observability::{observability_middleware, Metrics};

/// Assemble the full application: API routes, health, optional `/metrics`, and
/// the middleware stack (outermost first: observability, request timeout, CORS,
/// validation, security headers).
///
/// The timeout sits inside the observability layer so timed out requests are
/// still recorded, as 408.
pub fn create_app(
    state: ApiState,
    metrics: Arc<Metrics>,
    expose_metrics: bool,
    request_timeout: Duration,
) -> Router {
    let metrics_for_middleware = metrics.clone();

    let mut app = Router::new().route("/health/status", get(health_check));

    if expose_metrics {
        app = app.merge(
            Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(metrics),
        );
    }

    app.merge(create_api_router(state))
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(axum_middleware::from_fn(request_validation_middleware))
        .layer(cors_layer())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(axum_middleware::from_fn(move |req, next| {
            observability_middleware(metrics_for_middleware.clone(), req, next)
        }))
}
