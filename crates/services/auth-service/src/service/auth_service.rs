//! Authentication service - login, token checks, logout and credential changes.
//!
//! Wired explicitly from its collaborators: identity repository, session
//! store, token issuer and credential workers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::ValidateEmail;

use common::{AppError, AppResult};
use domain::{
    is_valid_username, Identity, NewIdentity, TokenError, MAX_USERNAME_LENGTH,
    MIN_PASSWORD_LENGTH, MIN_USERNAME_LENGTH,
};

use super::credential_workers::CredentialWorkers;
use crate::repository::IdentityRepository;
use crate::session::SessionStore;
use crate::token::{TokenIssuer, TokenResponse};

/// Authentication service trait for dependency injection.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Register a new identity
    async fn register(&self, username: String, email: String, password: String)
        -> AppResult<Identity>;

    /// Check credentials and issue a session-backed token
    async fn login(&self, username: String, password: String) -> AppResult<TokenResponse>;

    /// Resolve a presented token to its identity
    async fn authenticate(&self, token: &str) -> AppResult<Uuid>;

    /// End the session behind a token
    async fn logout(&self, token: &str) -> AppResult<()>;

    /// Replace the password and end every session of the identity.
    ///
    /// The new hash is stored before sessions are revoked. If revocation
    /// fails the error is returned with the new password already in effect,
    /// so a retry must present the new password as the current one.
    async fn change_password(
        &self,
        identity_id: Uuid,
        old_password: String,
        new_password: String,
    ) -> AppResult<()>;

    /// Soft-deactivate an identity and end all of its sessions
    async fn deactivate(&self, identity_id: Uuid) -> AppResult<()>;
}

/// Concrete implementation of AuthService.
pub struct Authenticator {
    identities: Arc<dyn IdentityRepository>,
    sessions: Arc<dyn SessionStore>,
    tokens: Arc<TokenIssuer>,
    workers: Arc<CredentialWorkers>,
    min_password_length: usize,
}

impl Authenticator {
    /// Create new auth service instance
    pub fn new(
        identities: Arc<dyn IdentityRepository>,
        sessions: Arc<dyn SessionStore>,
        tokens: Arc<TokenIssuer>,
        workers: Arc<CredentialWorkers>,
    ) -> Self {
        Self {
            identities,
            sessions,
            tokens,
            workers,
            min_password_length: MIN_PASSWORD_LENGTH,
        }
    }

    /// Override the minimum accepted password length.
    pub fn with_min_password_length(mut self, min: usize) -> Self {
        self.min_password_length = min;
        self
    }

    fn validate_password(&self, password: &str) -> AppResult<()> {
        if password.chars().count() < self.min_password_length {
            return Err(AppError::validation(format!(
                "Password must be at least {} characters",
                self.min_password_length
            )));
        }
        Ok(())
    }

    /// Upgrade a stored hash produced with outdated parameters. Failure only
    /// costs the upgrade, never the login.
    async fn upgrade_credential(&self, identity: &Identity, password: String) {
        if !self.workers.needs_rehash(&identity.credential) {
            return;
        }

        let result = match self.workers.hash(password).await {
            Ok(credential) => self.identities.update_credential(identity.id, credential).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => info!(identity_id = %identity.id, "Credential hash upgraded"),
            Err(e) => warn!(identity_id = %identity.id, "Credential hash upgrade failed: {}", e),
        }
    }
}

#[async_trait]
impl AuthService for Authenticator {
    async fn register(
        &self,
        username: String,
        email: String,
        password: String,
    ) -> AppResult<Identity> {
        let username = username.trim().to_string();
        let email = email.trim().to_lowercase();

        if !is_valid_username(&username) {
            return Err(AppError::validation(format!(
                "Username must be {}-{} characters of letters, digits, '_', '.' or '-'",
                MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
            )));
        }
        if !email.validate_email() {
            return Err(AppError::validation("Invalid email format"));
        }
        self.validate_password(&password)?;

        // Cheap check before paying for a hash; create still enforces uniqueness
        if self.identities.exists(&username, &email).await? {
            return Err(AppError::conflict("Username or email"));
        }

        let credential = self.workers.hash(password).await?;
        let identity = self
            .identities
            .create(NewIdentity {
                username,
                email,
                credential,
            })
            .await?;

        info!(identity_id = %identity.id, username = %identity.username, "Identity registered");
        Ok(identity)
    }

    async fn login(&self, username: String, password: String) -> AppResult<TokenResponse> {
        let username = username.trim();
        let found = self.identities.find_by_username(username).await?;

        let identity = match found {
            Some(identity) => identity,
            None => {
                // Same hashing cost as a real check so timing reveals nothing
                self.workers.verify_dummy(password).await?;
                warn!(username = %username, "Login failed: unknown username");
                return Err(AppError::InvalidCredentials);
            }
        };

        let matches = self
            .workers
            .verify(password.clone(), identity.credential.clone())
            .await?;

        if !identity.is_active() {
            warn!(identity_id = %identity.id, "Login failed: identity deactivated");
            return Err(AppError::InvalidCredentials);
        }
        if !matches {
            warn!(identity_id = %identity.id, "Login failed: wrong password");
            return Err(AppError::InvalidCredentials);
        }

        self.upgrade_credential(&identity, password).await;

        let issued = self.tokens.issue(identity.id)?;
        self.sessions.record(&issued.session()).await?;

        info!(
            identity_id = %identity.id,
            token_id = %issued.token_id,
            expires_at = %issued.expires_at,
            "Login succeeded"
        );
        Ok(TokenResponse::from(&issued))
    }

    async fn authenticate(&self, token: &str) -> AppResult<Uuid> {
        let verified = self.tokens.verify(token)?;

        if !self.sessions.is_valid(verified.token_id).await? {
            debug!(token_id = %verified.token_id, "Token rejected: session revoked or missing");
            return Err(AppError::Unauthenticated);
        }

        Ok(verified.identity_id)
    }

    async fn logout(&self, token: &str) -> AppResult<()> {
        match self.tokens.verify(token) {
            Ok(verified) => {
                self.sessions.revoke(verified.token_id).await?;
                info!(
                    identity_id = %verified.identity_id,
                    token_id = %verified.token_id,
                    "Logged out"
                );
                Ok(())
            }
            // Nothing left to end
            Err(TokenError::Expired) => {
                debug!("Logout with expired token");
                Ok(())
            }
            Err(reason) => Err(reason.into()),
        }
    }

    async fn change_password(
        &self,
        identity_id: Uuid,
        old_password: String,
        new_password: String,
    ) -> AppResult<()> {
        let identity = self
            .identities
            .find_by_id(identity_id)
            .await?
            .filter(Identity::is_active)
            .ok_or(AppError::Unauthenticated)?;

        if !self
            .workers
            .verify(old_password, identity.credential.clone())
            .await?
        {
            warn!(identity_id = %identity_id, "Password change failed: wrong current password");
            return Err(AppError::InvalidCredentials);
        }

        self.validate_password(&new_password)?;
        let credential = self.workers.hash(new_password).await?;
        self.identities
            .update_credential(identity_id, credential)
            .await?;

        let revoked = match self.sessions.revoke_all(identity_id).await {
            Ok(revoked) => revoked,
            Err(e) => {
                error!(
                    identity_id = %identity_id,
                    "Password changed but old sessions are still live: {}", e
                );
                return Err(e);
            }
        };
        info!(identity_id = %identity_id, revoked, "Password changed, sessions revoked");
        Ok(())
    }

    async fn deactivate(&self, identity_id: Uuid) -> AppResult<()> {
        self.identities.deactivate(identity_id).await?;
        let revoked = self.sessions.revoke_all(identity_id).await?;
        info!(identity_id = %identity_id, revoked, "Identity deactivated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::repository::{InMemoryIdentityRepository, MockIdentityRepository};
    use crate::session::{InMemorySessionStore, MockSessionStore};
    use crate::token::{KeyRing, SigningKey};
    use chrono::Duration;
    use domain::{CredentialHasher, HashParams};
    use mockall::predicate::eq;

    fn authenticator(repo: MockIdentityRepository) -> Authenticator {
        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        let sessions = Arc::new(InMemorySessionStore::new(clock.clone()));
        wire(Arc::new(repo), sessions, clock)
    }

    fn wire(
        identities: Arc<dyn IdentityRepository>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<ManualClock>,
    ) -> Authenticator {
        let key = SigningKey::new("test", "unit-test-signing-secret-of-32-bytes").unwrap();
        let tokens = Arc::new(TokenIssuer::new(
            KeyRing::new(key),
            Duration::minutes(15),
            "auth-service",
            clock.clone(),
        ));
        let hasher = CredentialHasher::new(HashParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();

        Authenticator::new(
            identities,
            sessions,
            tokens,
            Arc::new(CredentialWorkers::new(hasher, 2)),
        )
    }

    #[tokio::test]
    async fn test_login_unknown_username_is_invalid_credentials() {
        let mut repo = MockIdentityRepository::new();
        repo.expect_find_by_username()
            .with(eq("ghost"))
            .times(1)
            .returning(|_| Ok(None));

        let service = authenticator(repo);
        let err = service
            .login("ghost".to_string(), "whatever".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_propagates_repository_outage() {
        let mut repo = MockIdentityRepository::new();
        repo.expect_find_by_username()
            .returning(|_| Err(AppError::unavailable("database")));

        let service = authenticator(repo);
        let err = service
            .login("raphael".to_string(), "pw123456".to_string())
            .await
            .unwrap_err();

        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_register_validation() {
        let mut repo = MockIdentityRepository::new();
        repo.expect_exists().never();
        repo.expect_create().never();

        let service = authenticator(repo);

        let err = service
            .register("ab".into(), "ab@example.com".into(), "long-enough".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service
            .register("raphael".into(), "not-an-email".into(), "long-enough".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service
            .register("raphael".into(), "raphael@example.com".into(), "short".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_register_rejects_malformed_emails() {
        let mut repo = MockIdentityRepository::new();
        repo.expect_exists().never();
        repo.expect_create().never();

        let service = authenticator(repo);
        for email in ["", "raphael", "@example.com", "a@b@example.com", "raphael @example.com"] {
            let err = service
                .register("raphael".into(), email.into(), "long-enough".into())
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "accepted {:?}", email);
        }
    }

    #[tokio::test]
    async fn test_change_password_revocation_outage_keeps_new_password() {
        let mut sessions = MockSessionStore::new();
        let mut failed = false;
        sessions.expect_revoke_all().times(2).returning(move |_| {
            if failed {
                Ok(0)
            } else {
                failed = true;
                Err(AppError::unavailable("session store"))
            }
        });

        let clock = Arc::new(ManualClock::at_unix(1_700_000_000));
        let service = wire(
            Arc::new(InMemoryIdentityRepository::new()),
            Arc::new(sessions),
            clock,
        );
        let identity = service
            .register("raphael".into(), "raphael@example.com".into(), "first-password".into())
            .await
            .unwrap();

        let err = service
            .change_password(identity.id, "first-password".into(), "second-password".into())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());

        // The new hash was stored, so the old password no longer counts as current
        let err = service
            .change_password(identity.id, "first-password".into(), "second-password".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));

        service
            .change_password(identity.id, "second-password".into(), "second-password".into())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_duplicate_is_conflict() {
        let mut repo = MockIdentityRepository::new();
        repo.expect_exists()
            .with(eq("raphael"), eq("raphael@example.com"))
            .returning(|_, _| Ok(true));
        repo.expect_create().never();

        let service = authenticator(repo);
        let err = service
            .register(
                " raphael ".into(),
                "Raphael@Example.com".into(),
                "long-enough".into(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_change_password_for_missing_identity() {
        let mut repo = MockIdentityRepository::new();
        repo.expect_find_by_id().returning(|_| Ok(None));
        repo.expect_update_credential().never();

        let service = authenticator(repo);
        let err = service
            .change_password(Uuid::new_v4(), "old".into(), "new-password".into())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_logout_with_garbage_token() {
        let service = authenticator(MockIdentityRepository::new());
        let err = service.logout("garbage").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }
}
