//! HTTP request handlers.

pub mod auth_handler;
pub mod health_handler;

pub use auth_handler::{credential_routes, logout_routes, session_routes};
pub use health_handler::health_routes;
