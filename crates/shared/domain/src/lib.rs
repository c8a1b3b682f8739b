//! Domain layer - Core authentication entities and value objects.
//!
//! This crate contains pure domain logic with no infrastructure dependencies:
//! identities, self-describing credential hashes, sessions, and the error
//! types shared by every service.

pub mod constants;
pub mod credential;
pub mod error;
pub mod identity;
pub mod session;

pub use constants::*;
pub use credential::{CredentialHash, CredentialHasher, HashParams};
pub use error::{DomainError, DomainResult, TokenError};
pub use identity::{Identity, IdentityResponse, NewIdentity};
pub use session::Session;
