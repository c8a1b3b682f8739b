//! Bounded pool for CPU-heavy credential hashing.
//!
//! Argon2 runs for tens of milliseconds with megabytes of memory per call,
//! so it is moved off the async workers onto the blocking pool and capped
//! by a semaphore.

use std::sync::Arc;

use tokio::sync::{OnceCell, Semaphore};

use common::{AppError, AppResult};
use domain::{CredentialHash, CredentialHasher};

/// Runs hash and verify calls with at most `workers` in flight.
pub struct CredentialWorkers {
    hasher: Arc<CredentialHasher>,
    permits: Arc<Semaphore>,
    dummy: OnceCell<CredentialHash>,
}

impl CredentialWorkers {
    pub fn new(hasher: CredentialHasher, workers: usize) -> Self {
        Self {
            hasher: Arc::new(hasher),
            permits: Arc::new(Semaphore::new(workers.max(1))),
            dummy: OnceCell::new(),
        }
    }

    async fn run<T, F>(&self, job: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&CredentialHasher) -> T + Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AppError::unavailable("credential workers"))?;

        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || job(&hasher))
            .await
            .map_err(|e| AppError::internal(format!("Credential worker failed: {}", e)))
    }

    /// Hash a plaintext with a fresh salt.
    pub async fn hash(&self, plaintext: String) -> AppResult<CredentialHash> {
        self.run(move |hasher| hasher.hash(&plaintext)).await?.map_err(AppError::from)
    }

    /// Verify a plaintext against a stored hash.
    pub async fn verify(&self, plaintext: String, stored: CredentialHash) -> AppResult<bool> {
        self.run(move |hasher| hasher.verify(&plaintext, &stored)).await
    }

    /// Burn one verification against a real hash of the current parameters
    /// so a missing identity costs the same as a wrong password.
    pub async fn verify_dummy(&self, plaintext: String) -> AppResult<()> {
        let dummy = self
            .dummy
            .get_or_try_init(|| self.hash("credential-timing-equaliser".to_string()))
            .await?
            .clone();
        self.verify(plaintext, dummy).await?;
        Ok(())
    }

    /// Whether the stored hash should be upgraded to current parameters.
    pub fn needs_rehash(&self, stored: &CredentialHash) -> bool {
        self.hasher.needs_rehash(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::HashParams;

    fn workers(count: usize) -> CredentialWorkers {
        let hasher = CredentialHasher::new(HashParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        CredentialWorkers::new(hasher, count)
    }

    #[tokio::test]
    async fn test_hash_then_verify() {
        let pool = workers(2);
        let stored = pool.hash("correct horse".to_string()).await.unwrap();

        assert!(pool.verify("correct horse".to_string(), stored.clone()).await.unwrap());
        assert!(!pool.verify("wrong horse".to_string(), stored.clone()).await.unwrap());
        assert!(!pool.needs_rehash(&stored));
    }

    #[tokio::test]
    async fn test_concurrent_calls_complete_with_one_worker() {
        let pool = Arc::new(workers(1));
        let mut handles = Vec::new();
        for i in 0..4 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.hash(format!("password-{}", i)).await
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
    }

    #[tokio::test]
    async fn test_empty_password_rejected() {
        let pool = workers(1);
        let err = pool.hash(String::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_verify_dummy_succeeds() {
        let pool = workers(1);
        pool.verify_dummy("anything".to_string()).await.unwrap();
        pool.verify_dummy("again".to_string()).await.unwrap();
    }
}
