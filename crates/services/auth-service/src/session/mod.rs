//! Server-side session records keyed by token id.
//!
//! A token is only usable while its session is present, unrevoked and
//! unexpired. Revocation is monotonic: nothing ever clears the flag.

mod database;
mod guarded;
mod memory;
mod sweeper;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use common::AppResult;
use domain::Session;

pub use database::DbSessionStore;
pub use guarded::GuardedSessionStore;
pub use memory::InMemorySessionStore;
pub use sweeper::{SessionSweeper, SweeperHandle};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Session store trait for dependency injection.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record a newly issued token. Recording an id that already exists
    /// updates its times but keeps a revoked session revoked.
    async fn record(&self, session: &Session) -> AppResult<()>;

    /// True only if the session exists, is not revoked and has not expired.
    async fn is_valid(&self, token_id: Uuid) -> AppResult<bool>;

    /// Revoke one session. Unknown ids are a no-op.
    async fn revoke(&self, token_id: Uuid) -> AppResult<()>;

    /// Revoke every session of an identity, returning how many changed.
    async fn revoke_all(&self, identity_id: Uuid) -> AppResult<u64>;

    /// Delete sessions that expired before `cutoff`, returning how many.
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}
