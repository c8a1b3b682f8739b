//! Process-local session store for tests and single-node development.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use common::AppResult;
use domain::Session;

use super::SessionStore;
use crate::clock::Clock;

#[derive(Default)]
struct Sessions {
    by_token: HashMap<Uuid, Session>,
    by_identity: HashMap<Uuid, HashSet<Uuid>>,
}

/// Session store backed by a map behind a lock.
pub struct InMemorySessionStore {
    sessions: RwLock<Sessions>,
    clock: Arc<dyn Clock>,
}

impl InMemorySessionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            clock,
        }
    }

    /// Number of records currently held (revoked and expired included).
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_token
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn record(&self, session: &Session) -> AppResult<()> {
        let mut guard = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let Sessions {
            by_token,
            by_identity,
        } = &mut *guard;

        let mut record = session.clone();
        if let Some(existing) = by_token.get(&session.token_id) {
            record.revoked |= existing.revoked;
            if existing.identity_id != record.identity_id {
                if let Some(ids) = by_identity.get_mut(&existing.identity_id) {
                    ids.remove(&record.token_id);
                }
            }
        }

        by_identity
            .entry(record.identity_id)
            .or_default()
            .insert(record.token_id);
        by_token.insert(record.token_id, record);
        Ok(())
    }

    async fn is_valid(&self, token_id: Uuid) -> AppResult<bool> {
        let now = self.clock.now();
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions
            .by_token
            .get(&token_id)
            .is_some_and(|session| session.is_valid_at(now)))
    }

    async fn revoke(&self, token_id: Uuid) -> AppResult<()> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = sessions.by_token.get_mut(&token_id) {
            session.revoke();
        }
        Ok(())
    }

    async fn revoke_all(&self, identity_id: Uuid) -> AppResult<u64> {
        let mut guard = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let Sessions {
            by_token,
            by_identity,
        } = &mut *guard;

        let Some(token_ids) = by_identity.get(&identity_id) else {
            return Ok(0);
        };

        let mut revoked = 0;
        for token_id in token_ids {
            if by_token.get_mut(token_id).is_some_and(Session::revoke) {
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut guard = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let Sessions {
            by_token,
            by_identity,
        } = &mut *guard;

        let expired: Vec<Session> = by_token
            .values()
            .filter(|session| session.expires_at < cutoff)
            .cloned()
            .collect();

        for session in &expired {
            by_token.remove(&session.token_id);
            if let Some(ids) = by_identity.get_mut(&session.identity_id) {
                ids.remove(&session.token_id);
                if ids.is_empty() {
                    by_identity.remove(&session.identity_id);
                }
            }
        }

        Ok(expired.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    const START: i64 = 1_700_000_000;

    fn setup() -> (Arc<ManualClock>, InMemorySessionStore) {
        let clock = Arc::new(ManualClock::at_unix(START));
        let store = InMemorySessionStore::new(clock.clone());
        (clock, store)
    }

    fn session_for(identity_id: Uuid, clock: &ManualClock, minutes: i64) -> Session {
        let now = clock.now();
        Session::new(Uuid::new_v4(), identity_id, now, now + Duration::minutes(minutes))
    }

    #[tokio::test]
    async fn test_record_then_valid() {
        let (clock, store) = setup();
        let session = session_for(Uuid::new_v4(), &clock, 15);

        store.record(&session).await.unwrap();

        assert!(store.is_valid(session.token_id).await.unwrap());
        assert!(!store.is_valid(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_session_invalid() {
        let (clock, store) = setup();
        let session = session_for(Uuid::new_v4(), &clock, 15);
        store.record(&session).await.unwrap();

        clock.advance(Duration::minutes(15));
        assert!(!store.is_valid(session.token_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (clock, store) = setup();
        let session = session_for(Uuid::new_v4(), &clock, 15);
        store.record(&session).await.unwrap();

        store.revoke(session.token_id).await.unwrap();
        store.revoke(session.token_id).await.unwrap();
        store.revoke(Uuid::new_v4()).await.unwrap();

        assert!(!store.is_valid(session.token_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_never_clears_revocation() {
        let (clock, store) = setup();
        let session = session_for(Uuid::new_v4(), &clock, 15);
        store.record(&session).await.unwrap();
        store.revoke(session.token_id).await.unwrap();

        store.record(&session).await.unwrap();
        assert!(!store.is_valid(session.token_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_all_scoped_to_identity() {
        let (clock, store) = setup();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let a1 = session_for(alice, &clock, 15);
        let a2 = session_for(alice, &clock, 15);
        let b1 = session_for(bob, &clock, 15);
        for session in [&a1, &a2, &b1] {
            store.record(session).await.unwrap();
        }
        store.revoke(a2.token_id).await.unwrap();

        assert_eq!(store.revoke_all(alice).await.unwrap(), 1);
        assert_eq!(store.revoke_all(alice).await.unwrap(), 0);
        assert_eq!(store.revoke_all(Uuid::new_v4()).await.unwrap(), 0);

        assert!(!store.is_valid(a1.token_id).await.unwrap());
        assert!(!store.is_valid(a2.token_id).await.unwrap());
        assert!(store.is_valid(b1.token_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (clock, store) = setup();
        let identity = Uuid::new_v4();
        let short = session_for(identity, &clock, 5);
        let long = session_for(identity, &clock, 60);
        store.record(&short).await.unwrap();
        store.record(&long).await.unwrap();

        clock.advance(Duration::minutes(10));
        let purged = store.purge_expired(clock.now()).await.unwrap();

        assert_eq!(purged, 1);
        assert_eq!(store.len(), 1);
        assert!(store.is_valid(long.token_id).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_lose_no_updates() {
        const WRITERS: usize = 32;
        let (clock, store) = setup();
        let store = Arc::new(store);
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        // Phase one: both identities record sessions from many tasks at once
        let mut recorders = Vec::new();
        for i in 0..WRITERS * 2 {
            let store = store.clone();
            let owner = if i % 2 == 0 { alice } else { bob };
            let session = session_for(owner, &clock, 15);
            recorders.push(tokio::spawn(async move {
                store.record(&session).await.unwrap();
                assert!(store.is_valid(session.token_id).await.unwrap());
                (owner, session.token_id)
            }));
        }
        let mut recorded = Vec::new();
        for task in recorders {
            recorded.push(task.await.unwrap());
        }
        assert_eq!(store.len(), WRITERS * 2);

        // Phase two: revoke alice while bob keeps recording and revoking
        let revoker = {
            let store = store.clone();
            tokio::spawn(async move { store.revoke_all(alice).await.unwrap() })
        };
        let mut churn = Vec::new();
        for _ in 0..WRITERS {
            let store = store.clone();
            let session = session_for(bob, &clock, 15);
            churn.push(tokio::spawn(async move {
                store.record(&session).await.unwrap();
                assert!(store.is_valid(session.token_id).await.unwrap());
                store.revoke(session.token_id).await.unwrap();
                assert!(!store.is_valid(session.token_id).await.unwrap());
            }));
        }
        for task in churn {
            task.await.unwrap();
        }

        assert_eq!(revoker.await.unwrap(), WRITERS as u64);
        for (owner, token_id) in recorded {
            assert_eq!(store.is_valid(token_id).await.unwrap(), owner == bob);
        }
        assert_eq!(store.len(), WRITERS * 3);
    }
}
