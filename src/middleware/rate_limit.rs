use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::error::{AppError, AppResult};

/// Type alias for the global governor layer (IP-based rate limiting)
pub type GlobalGovernorLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    Body,
>;

/// Per-IP limit applied before authentication: bursts of 1000, one token every 60ms.
/// Needs the connect info of `into_make_service_with_connect_info`.
pub fn create_global_governor() -> AppResult<GlobalGovernorLayer> {
    let config = GovernorConfigBuilder::default()
        .per_millisecond(60)
        .burst_size(1000)
        .finish()
        .ok_or_else(|| AppError::Internal("Invalid global rate limit".to_string()))?;

    Ok(GovernorLayer::new(Arc::new(config)))
}

/// Log failed and throttled requests
pub async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!(method = %method, uri = %uri, "Request rejected by rate limiter");
    } else if status.is_server_error() {
        tracing::error!(method = %method, uri = %uri, status = %status, "Request failed");
    } else if status.is_client_error() {
        tracing::debug!(method = %method, uri = %uri, status = %status, "Request rejected");
    }

    response
}
