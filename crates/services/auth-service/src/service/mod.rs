//! Authentication service business logic.

mod auth_service;
mod credential_workers;
mod seed;

pub use auth_service::{AuthService, Authenticator};
pub use credential_workers::CredentialWorkers;
pub use seed::{default_seeds, seed_identities, SeedIdentity, SeedReport};
