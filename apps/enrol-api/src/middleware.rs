//! Request logging middleware.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::Next,
    response::Response,
};

/// Log one line per request with the matched route, status and latency.
///
/// The route pattern is logged instead of the raw URI so query strings never
/// reach the logs.
pub async fn request_log_middleware(
    matched_path: Option<MatchedPath>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let route = matched_path
        .as_ref()
        .map_or_else(|| "unmatched".to_string(), |m| m.as_str().to_string());

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        tracing::warn!(target: "http", %method, %route, status, latency_ms, "Request failed");
    } else {
        tracing::info!(target: "http", %method, %route, status, latency_ms, "Request completed");
    }

    response
}
