// src/middleware/trace.rs - HTTP observability span/fields
use axum::http::{Request, Response};
use std::time::Duration;
use tracing::{info_span, Level, Span};
use uuid::Uuid;

/// Build the per-request span. Fields filled in later are declared empty so
/// `on_response` can record into them without widening the span's schema.
pub fn make_span<B>(request: &Request<B>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
        endpoint = classify_endpoint(request.uri().path()),
        status_code = tracing::field::Empty,
        response_time_ms = tracing::field::Empty,
    )
}

pub fn on_request<B>(request: &Request<B>, _span: &Span) {
    tracing::debug!(path = %request.uri().path(), "processing request");
}

pub fn on_response<B>(response: &Response<B>, latency: Duration, span: &Span) {
    let status = response.status();
    let response_time_ms = latency.as_millis();

    span.record("status_code", status.as_u16());
    span.record("response_time_ms", response_time_ms);

    let level = match status.as_u16() {
        200..=399 => Level::INFO,
        400..=499 => Level::WARN,
        _ => Level::ERROR,
    };

    match level {
        Level::ERROR => tracing::error!(status = %status, latency_ms = response_time_ms, "request failed"),
        Level::WARN => tracing::warn!(status = %status, latency_ms = response_time_ms, "request rejected"),
        _ => tracing::info!(status = %status, latency_ms = response_time_ms, "request completed"),
    }
}

fn classify_endpoint(path: &str) -> &'static str {
    match path {
        "/health" | "/ready" => "health",
        p if p.ends_with("/status") => "status",
        p if p.ends_with("/enc_keys") => "enc_keys",
        p if p.ends_with("/dec_keys") => "dec_keys",
        _ => "other",
    }
}

fn status_class(status_code: u16) -> &'static str {
    match status_code {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_endpoint() {
        assert_eq!(classify_endpoint("/health"), "health");
        assert_eq!(classify_endpoint("/api/v1/keys/MMMMNNNNOOOOPPPP/status"), "status");
        assert_eq!(classify_endpoint("/api/v1/keys/MMMMNNNNOOOOPPPP/enc_keys"), "enc_keys");
        assert_eq!(classify_endpoint("/api/v1/keys/IIIIJJJJKKKKLLLL/dec_keys"), "dec_keys");
        assert_eq!(classify_endpoint("/unknown"), "other");
    }

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(200), "2xx");
        assert_eq!(status_class(404), "4xx");
        assert_eq!(status_class(503), "5xx");
    }
}
