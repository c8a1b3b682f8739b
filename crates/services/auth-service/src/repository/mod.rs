//! Repository layer for identity data access.

pub mod entities;
mod identity_repository;
mod memory;

pub use identity_repository::{IdentityRepository, IdentityStore};
pub use memory::InMemoryIdentityRepository;

#[cfg(any(test, feature = "test-utils"))]
pub use identity_repository::MockIdentityRepository;
