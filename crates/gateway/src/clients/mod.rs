//! gRPC clients for calling backend services.

mod auth_client;

pub use auth_client::{AuthApi, AuthClient, TokenResponse};
