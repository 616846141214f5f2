use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{Json, Response},
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

const MAX_REQUEST_SIZE: u64 = 1024 * 1024; // 1MB

/// Request validation middleware
pub async fn request_validation_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<Value>)> {
    validate_content_type(&request)?;
    validate_request_size(&request)?;

    Ok(next.run(request).await)
}

/// Bodies of write requests must be JSON
fn validate_content_type(request: &Request<Body>) -> Result<(), (StatusCode, Json<Value>)> {
    let method = request.method();

    if method == Method::POST || method == Method::PUT || method == Method::PATCH {
        match request.headers().get(header::CONTENT_TYPE) {
            Some(content_type) => {
                let content_type_str = content_type.to_str().unwrap_or("");

                if !content_type_str.starts_with("application/json") {
                    warn!("Invalid content type: {}", content_type_str);
                    return Err((
                        StatusCode::UNSUPPORTED_MEDIA_TYPE,
                        Json(json!({
                            "error": "Content-Type must be application/json",
                            "timestamp": chrono::Utc::now().to_rfc3339(),
                        })),
                    ));
                }
            }
            None => {
                warn!("Missing content type header");
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Content-Type header is required for requests with body",
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                    })),
                ));
            }
        }
    }

    Ok(())
}

fn validate_request_size(request: &Request<Body>) -> Result<(), (StatusCode, Json<Value>)> {
    let length = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());

    if let Some(length) = length {
        if length > MAX_REQUEST_SIZE {
            error!("Request too large: {} bytes", length);
            return Err((
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({
                    "error": format!(
                        "Request size {} bytes exceeds maximum of {} bytes",
                        length, MAX_REQUEST_SIZE
                    ),
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                })),
            ));
        }
    }

    Ok(())
}

/// Permissive CORS for browser front-ends, including the identity header
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(super::api::USER_ID_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(86400))
}

/// Security headers middleware
pub async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'self'"),
    );

    response
}
