//! Timeout and retry wrapper around a session store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use common::{AppError, AppResult};
use domain::Session;

use super::SessionStore;

/// Bounds every call with a timeout and retries an unavailable store once.
///
/// A failure is always surfaced as an error; it never turns into a
/// positive answer.
pub struct GuardedSessionStore {
    inner: Arc<dyn SessionStore>,
    timeout: Duration,
    retry_backoff: Duration,
}

impl GuardedSessionStore {
    pub fn new(inner: Arc<dyn SessionStore>, timeout: Duration, retry_backoff: Duration) -> Self {
        Self {
            inner,
            timeout,
            retry_backoff,
        }
    }

    async fn attempt<T, F, Fut>(&self, operation: &'static str, call: F) -> AppResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        match self.bounded(operation, call()).await {
            Err(err) if err.is_unavailable() => {
                warn!(operation, "Session store unavailable, retrying once");
                tokio::time::sleep(self.retry_backoff).await;
                self.bounded(operation, call()).await
            }
            result => result,
        }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "Session store timed out");
                Err(AppError::unavailable("session store"))
            }
        }
    }
}

#[async_trait]
impl SessionStore for GuardedSessionStore {
    async fn record(&self, session: &Session) -> AppResult<()> {
        self.attempt("record", || self.inner.record(session)).await
    }

    async fn is_valid(&self, token_id: Uuid) -> AppResult<bool> {
        self.attempt("is_valid", || self.inner.is_valid(token_id)).await
    }

    async fn revoke(&self, token_id: Uuid) -> AppResult<()> {
        self.attempt("revoke", || self.inner.revoke(token_id)).await
    }

    async fn revoke_all(&self, identity_id: Uuid) -> AppResult<u64> {
        self.attempt("revoke_all", || self.inner.revoke_all(identity_id))
            .await
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.attempt("purge_expired", || self.inner.purge_expired(cutoff))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails `failures` times with Unavailable, then reports valid.
    struct FlakyStore {
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
            }
        }

        fn next(&self) -> AppResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(AppError::unavailable("flaky"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn record(&self, _session: &Session) -> AppResult<()> {
            self.next()
        }
        async fn is_valid(&self, _token_id: Uuid) -> AppResult<bool> {
            self.next().map(|_| true)
        }
        async fn revoke(&self, _token_id: Uuid) -> AppResult<()> {
            self.next()
        }
        async fn revoke_all(&self, _identity_id: Uuid) -> AppResult<u64> {
            self.next().map(|_| 1)
        }
        async fn purge_expired(&self, _cutoff: DateTime<Utc>) -> AppResult<u64> {
            self.next().map(|_| 0)
        }
    }

    /// Never answers within any reasonable timeout.
    struct StalledStore;

    #[async_trait]
    impl SessionStore for StalledStore {
        async fn record(&self, _session: &Session) -> AppResult<()> {
            std::future::pending().await
        }
        async fn is_valid(&self, _token_id: Uuid) -> AppResult<bool> {
            std::future::pending().await
        }
        async fn revoke(&self, _token_id: Uuid) -> AppResult<()> {
            std::future::pending().await
        }
        async fn revoke_all(&self, _identity_id: Uuid) -> AppResult<u64> {
            std::future::pending().await
        }
        async fn purge_expired(&self, _cutoff: DateTime<Utc>) -> AppResult<u64> {
            std::future::pending().await
        }
    }

    fn guard(inner: Arc<dyn SessionStore>) -> GuardedSessionStore {
        GuardedSessionStore::new(inner, Duration::from_millis(20), Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_single_failure_is_retried() {
        let inner = Arc::new(FlakyStore::new(1));
        let store = guard(inner.clone());

        assert!(store.is_valid(Uuid::new_v4()).await.unwrap());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_failure_surfaces_unavailable() {
        let inner = Arc::new(FlakyStore::new(5));
        let store = guard(inner.clone());

        let err = store.is_valid(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_fails_closed() {
        let store = guard(Arc::new(StalledStore));

        let err = store.is_valid(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_unavailable());

        let err = store.revoke_all(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_non_transient_errors_not_retried() {
        struct Rejecting(AtomicUsize);

        #[async_trait]
        impl SessionStore for Rejecting {
            async fn record(&self, _session: &Session) -> AppResult<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(AppError::internal("constraint"))
            }
            async fn is_valid(&self, _token_id: Uuid) -> AppResult<bool> {
                Ok(false)
            }
            async fn revoke(&self, _token_id: Uuid) -> AppResult<()> {
                Ok(())
            }
            async fn revoke_all(&self, _identity_id: Uuid) -> AppResult<u64> {
                Ok(0)
            }
            async fn purge_expired(&self, _cutoff: DateTime<Utc>) -> AppResult<u64> {
                Ok(0)
            }
        }

        let inner = Arc::new(Rejecting(AtomicUsize::new(0)));
        let store = guard(inner.clone());
        let now = Utc::now();
        let session = Session::new(Uuid::new_v4(), Uuid::new_v4(), now, now);

        assert!(store.record(&session).await.is_err());
        assert_eq!(inner.0.load(Ordering::SeqCst), 1);
    }
}
