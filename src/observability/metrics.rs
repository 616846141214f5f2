use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),
    #[error("Failed to encode metrics: {0}")]
    Encoding(String),
}

/// Prometheus metrics for the feature flag service
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    // HTTP metrics
    pub http_requests_total: CounterVec,
    pub http_request_duration_seconds: HistogramVec,
    pub http_requests_in_flight: GaugeVec,

    // Store metrics
    pub store_operations_total: CounterVec,
    pub store_operation_duration_seconds: HistogramVec,

    // Business metrics
    pub flag_operations_total: CounterVec,
}

impl Metrics {
    /// Create a new metrics instance with all metrics registered on a fresh registry
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new(
                "http_requests_total",
                "Total number of HTTP requests processed",
            ),
            &["method", "endpoint", "status_code"],
        )?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["method", "endpoint"],
        )?;

        let http_requests_in_flight = GaugeVec::new(
            Opts::new(
                "http_requests_in_flight",
                "Number of HTTP requests currently being processed",
            ),
            &["method", "endpoint"],
        )?;

        let store_operations_total = CounterVec::new(
            Opts::new(
                "store_operations_total",
                "Total number of table store operations",
            ),
            &["operation", "table", "status"],
        )?;

        let store_operation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "store_operation_duration_seconds",
                "Table store operation duration in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
            &["operation", "table"],
        )?;

        let flag_operations_total = CounterVec::new(
            Opts::new(
                "flag_operations_total",
                "Total number of environment, feature flag and API key operations",
            ),
            &["operation", "entity", "status"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(store_operations_total.clone()))?;
        registry.register(Box::new(store_operation_duration_seconds.clone()))?;
        registry.register(Box::new(flag_operations_total.clone()))?;

        info!("Prometheus metrics initialized");

        Ok(Metrics {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            http_requests_in_flight,
            store_operations_total,
            store_operation_duration_seconds,
            flag_operations_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode all metrics in Prometheus text format
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }

    pub fn record_http_request(
        &self,
        method: &str,
        endpoint: &str,
        status_code: u16,
        duration_seconds: f64,
    ) {
        let status_str = status_code.to_string();

        self.http_requests_total
            .with_label_values(&[method, endpoint, &status_str])
            .inc();

        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration_seconds);
    }

    pub fn record_store_operation(
        &self,
        operation: &str,
        table: &str,
        success: bool,
        duration_seconds: f64,
    ) {
        let status = if success { "success" } else { "error" };

        self.store_operations_total
            .with_label_values(&[operation, table, status])
            .inc();

        self.store_operation_duration_seconds
            .with_label_values(&[operation, table])
            .observe(duration_seconds);
    }

    /// Count a service-level operation such as `create` on `FeatureFlag`
    pub fn record_entity_operation(&self, operation: &str, entity: &str, success: bool) {
        let status = if success { "success" } else { "error" };

        self.flag_operations_total
            .with_label_values(&[operation, entity, status])
            .inc();
    }

    pub fn increment_in_flight(&self, method: &str, endpoint: &str) {
        self.http_requests_in_flight
            .with_label_values(&[method, endpoint])
            .inc();
    }

    pub fn decrement_in_flight(&self, method: &str, endpoint: &str) {
        self.http_requests_in_flight
            .with_label_values(&[method, endpoint])
            .dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        assert!(Metrics::new().is_ok());
    }

    #[test]
    fn test_http_request_recording() {
        let metrics = Metrics::new().unwrap();

        metrics.record_http_request("GET", "/env/ff", 200, 0.123);
        metrics.record_http_request("POST", "/env/ff", 201, 0.456);

        let metrics_text = metrics.encode().unwrap();
        assert!(metrics_text.contains("http_requests_total"));
        assert!(metrics_text.contains("http_request_duration_seconds"));
    }

    #[test]
    fn test_store_operation_recording() {
        let metrics = Metrics::new().unwrap();

        metrics.record_store_operation("get_item", "FeatureFlag", true, 0.050);
        metrics.record_store_operation("query", "EnvApiKey", false, 0.100);

        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains("store_operations_total"));
        assert!(encoded.contains("store_operation_duration_seconds"));
        assert_eq!(
            metrics
                .store_operations_total
                .with_label_values(&["query", "EnvApiKey", "error"])
                .get(),
            1.0
        );
    }

    #[test]
    fn test_entity_operation_recording() {
        let metrics = Metrics::new().unwrap();

        metrics.record_entity_operation("create", "FeatureFlag", true);
        metrics.record_entity_operation("create", "FeatureFlag", true);
        metrics.record_entity_operation("generate", "ApiKey", false);

        assert_eq!(
            metrics
                .flag_operations_total
                .with_label_values(&["create", "FeatureFlag", "success"])
                .get(),
            2.0
        );
        assert!(metrics.encode().unwrap().contains("flag_operations_total"));
    }

    #[test]
    fn test_in_flight_requests() {
        let metrics = Metrics::new().unwrap();

        metrics.increment_in_flight("GET", "/env");
        metrics.increment_in_flight("GET", "/env");
        metrics.decrement_in_flight("GET", "/env");

        assert_eq!(
            metrics
                .http_requests_in_flight
                .with_label_values(&["GET", "/env"])
                .get(),
            1.0
        );
    }
}
