//! Gateway configuration.

use common::{env_parse, env_var, GrpcClientConfig, RateLimitConfig};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Auth service gRPC client settings
    pub auth_service: GrpcClientConfig,
    /// Redis URL for rate limiting
    pub redis_url: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Limit for authenticated endpoints
    pub rate_limit: RateLimitConfig,
    /// Stricter limit for login and registration
    pub auth_rate_limit: RateLimitConfig,
    /// Take the client address from X-Forwarded-For / X-Real-IP. Only safe
    /// when a proxy in front of the gateway overwrites those headers.
    pub trust_forwarded_headers: bool,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            auth_service: GrpcClientConfig {
                endpoint: env_var(&["AUTH_SERVICE_URL"])
                    .unwrap_or(defaults.auth_service.endpoint),
                connect_timeout_ms: env_parse(
                    &["AUTH_SERVICE_CONNECT_TIMEOUT_MS"],
                    defaults.auth_service.connect_timeout_ms,
                ),
                request_timeout_ms: env_parse(
                    &["AUTH_SERVICE_REQUEST_TIMEOUT_MS"],
                    defaults.auth_service.request_timeout_ms,
                ),
            },
            redis_url: env_var(&["GATEWAY_REDIS_URL", "REDIS_URL"]).unwrap_or(defaults.redis_url),
            host: env_var(&["GATEWAY_HOST"]).unwrap_or(defaults.host),
            port: env_parse(&["GATEWAY_PORT"], defaults.port),
            rate_limit: RateLimitConfig {
                max_requests: env_parse(
                    &["RATE_LIMIT_REQUESTS"],
                    defaults.rate_limit.max_requests,
                ),
                window_seconds: env_parse(
                    &["RATE_LIMIT_WINDOW_SECONDS"],
                    defaults.rate_limit.window_seconds,
                ),
            },
            auth_rate_limit: RateLimitConfig {
                max_requests: env_parse(
                    &["RATE_LIMIT_AUTH_REQUESTS"],
                    defaults.auth_rate_limit.max_requests,
                ),
                window_seconds: env_parse(
                    &["RATE_LIMIT_AUTH_WINDOW_SECONDS"],
                    defaults.auth_rate_limit.window_seconds,
                ),
            },
            trust_forwarded_headers: env_parse(
                &["GATEWAY_TRUST_FORWARDED_HEADERS"],
                defaults.trust_forwarded_headers,
            ),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            auth_service: GrpcClientConfig::default(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            rate_limit: RateLimitConfig::default(),
            auth_rate_limit: RateLimitConfig {
                max_requests: 10,
                window_seconds: 60,
            },
            trust_forwarded_headers: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_routes_limited_harder() {
        let config = GatewayConfig::default();
        assert!(config.auth_rate_limit.max_requests < config.rate_limit.max_requests);
        assert_eq!(config.auth_service.endpoint, "http://localhost:50051");
        assert!(!config.trust_forwarded_headers);
    }
}
