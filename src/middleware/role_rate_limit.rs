use axum::http::Request;
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::KeyExtractor, GovernorError, GovernorLayer,
};

use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;

/// Custom key extractor that extracts the account id from JWT claims in request extensions
#[derive(Debug, Clone, Copy)]
pub struct UserIdExtractor;

impl KeyExtractor for UserIdExtractor {
    type Key = i32;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        // Claims are set by auth_middleware, which must run first
        let claims = req
            .extensions()
            .get::<Claims>()
            .ok_or(GovernorError::UnableToExtractKey)?;

        Ok(claims.sub)
    }
}

pub type CustomerGovernorLayer = GovernorLayer<
    UserIdExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Per-customer limit on authenticated routes: bursts of 100, one token every 600ms.
/// Admin routes only sit behind the global per-IP limit.
pub fn create_customer_governor() -> AppResult<CustomerGovernorLayer> {
    let config = GovernorConfigBuilder::default()
        .per_millisecond(600)
        .burst_size(100)
        .key_extractor(UserIdExtractor)
        .finish()
        .ok_or_else(|| AppError::Internal("Invalid customer rate limit".to_string()))?;

    Ok(GovernorLayer::new(Arc::new(config)))
}
