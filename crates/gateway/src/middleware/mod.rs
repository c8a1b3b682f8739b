//! Middleware for authentication and rate limiting.

mod auth;
mod cache;
mod rate_limit;

pub use auth::{auth_middleware, bearer_token, CurrentIdentity};
pub use cache::Cache;
pub use rate_limit::{rate_limit_auth_middleware, rate_limit_middleware, RateLimiter};
