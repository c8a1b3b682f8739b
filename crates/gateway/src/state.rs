//! Application state for dependency injection.

use std::sync::Arc;

use crate::clients::AuthApi;
use crate::config::GatewayConfig;
use crate::middleware::RateLimiter;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthApi>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub config: GatewayConfig,
}

impl AppState {
    /// Create new app state.
    pub fn new(
        auth: Arc<dyn AuthApi>,
        rate_limiter: Arc<dyn RateLimiter>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            auth,
            rate_limiter,
            config,
        }
    }
}
