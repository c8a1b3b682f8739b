//! End-to-end authentication flows against in-memory stores.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use auth_service_lib::clock::{Clock, ManualClock};
use auth_service_lib::repository::{IdentityRepository, InMemoryIdentityRepository};
use auth_service_lib::service::{
    default_seeds, seed_identities, AuthService, Authenticator, CredentialWorkers,
};
use auth_service_lib::session::{InMemorySessionStore, SessionStore};
use auth_service_lib::token::{KeyRing, SigningKey, TokenIssuer};
use common::{AppError, AppResult};
use domain::{CredentialHasher, HashParams, Session, TokenError};

const START: i64 = 1_700_000_000;
const LIFETIME_MINUTES: i64 = 15;

fn fast_params() -> HashParams {
    HashParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    identities: Arc<InMemoryIdentityRepository>,
    sessions: Arc<InMemorySessionStore>,
    tokens: Arc<TokenIssuer>,
    service: Authenticator,
}

impl Harness {
    fn new() -> Self {
        Self::with_params(fast_params())
    }

    fn with_params(params: HashParams) -> Self {
        let clock = Arc::new(ManualClock::at_unix(START));
        let identities = Arc::new(InMemoryIdentityRepository::new());
        let sessions = Arc::new(InMemorySessionStore::new(clock.clone()));
        let tokens = Arc::new(TokenIssuer::new(
            KeyRing::new(key("k1")),
            Duration::minutes(LIFETIME_MINUTES),
            "auth-service",
            clock.clone(),
        ));
        let service = authenticator(identities.clone(), sessions.clone(), tokens.clone(), params);

        Self {
            clock,
            identities,
            sessions,
            tokens,
            service,
        }
    }

    async fn register(&self, username: &str, password: &str) -> Uuid {
        self.service
            .register(
                username.to_string(),
                format!("{}@example.com", username),
                password.to_string(),
            )
            .await
            .unwrap()
            .id
    }

    async fn login(&self, username: &str, password: &str) -> AppResult<String> {
        self.service
            .login(username.to_string(), password.to_string())
            .await
            .map(|response| response.access_token)
    }
}

fn key(kid: &str) -> SigningKey {
    SigningKey::new(kid, format!("{}-integration-test-signing-secret", kid)).unwrap()
}

fn authenticator(
    identities: Arc<dyn IdentityRepository>,
    sessions: Arc<dyn SessionStore>,
    tokens: Arc<TokenIssuer>,
    params: HashParams,
) -> Authenticator {
    let workers = Arc::new(CredentialWorkers::new(CredentialHasher::new(params).unwrap(), 2));
    Authenticator::new(identities, sessions, tokens, workers).with_min_password_length(5)
}

#[tokio::test]
async fn test_raphael_scenario() {
    let h = Harness::new();

    let identity = h
        .service
        .register(
            "raphael".to_string(),
            "raphael@example.com".to_string(),
            "pw123".to_string(),
        )
        .await
        .unwrap();

    let token = h.login("raphael", "pw123").await.unwrap();
    assert_eq!(h.service.authenticate(&token).await.unwrap(), identity.id);

    h.service
        .change_password(identity.id, "pw123".to_string(), "pw456".to_string())
        .await
        .unwrap();

    let err = h.service.authenticate(&token).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated));

    assert!(matches!(
        h.login("raphael", "pw123").await,
        Err(AppError::InvalidCredentials)
    ));
    let fresh = h.login("raphael", "pw456").await.unwrap();
    assert_eq!(h.service.authenticate(&fresh).await.unwrap(), identity.id);
}

#[tokio::test]
async fn test_logout_revokes_session_but_not_signature() {
    let h = Harness::new();
    h.register("raphael", "pw123").await;
    let token = h.login("raphael", "pw123").await.unwrap();

    h.service.logout(&token).await.unwrap();

    assert!(matches!(
        h.service.authenticate(&token).await,
        Err(AppError::Unauthenticated)
    ));
    assert!(h.tokens.verify(&token).is_ok());

    // Logging out again is harmless
    h.service.logout(&token).await.unwrap();
}

#[tokio::test]
async fn test_token_expiry_boundary() {
    let h = Harness::new();
    let id = h.register("raphael", "pw123").await;
    let token = h.login("raphael", "pw123").await.unwrap();

    h.clock
        .advance(Duration::minutes(LIFETIME_MINUTES) - Duration::seconds(1));
    assert_eq!(h.service.authenticate(&token).await.unwrap(), id);

    h.clock.advance(Duration::seconds(2));
    assert_eq!(h.tokens.verify(&token), Err(TokenError::Expired));
    assert!(matches!(
        h.service.authenticate(&token).await,
        Err(AppError::Unauthenticated)
    ));

    // An expired token counts as already logged out
    h.service.logout(&token).await.unwrap();
}

#[tokio::test]
async fn test_logout_with_forged_token_is_rejected() {
    let h = Harness::new();
    let outsider = TokenIssuer::new(
        KeyRing::new(key("k1-elsewhere")),
        Duration::minutes(LIFETIME_MINUTES),
        "auth-service",
        h.clock.clone(),
    );
    let forged = outsider.issue(Uuid::new_v4()).unwrap();

    assert!(matches!(
        h.service.logout(&forged.token).await,
        Err(AppError::Unauthenticated)
    ));
    assert!(matches!(
        h.service.logout("not-a-token").await,
        Err(AppError::Unauthenticated)
    ));
}

#[tokio::test]
async fn test_password_change_revokes_only_own_sessions() {
    let h = Harness::new();
    let alice = h.register("alice", "alice-pw").await;
    h.register("bob", "bob-pw1").await;

    let alice_web = h.login("alice", "alice-pw").await.unwrap();
    let alice_phone = h.login("alice", "alice-pw").await.unwrap();
    let bob_token = h.login("bob", "bob-pw1").await.unwrap();

    h.service
        .change_password(alice, "alice-pw".to_string(), "alice-new".to_string())
        .await
        .unwrap();

    for token in [&alice_web, &alice_phone] {
        assert!(h.service.authenticate(token).await.is_err());
    }
    assert!(h.service.authenticate(&bob_token).await.is_ok());
}

#[tokio::test]
async fn test_change_password_requires_current_password() {
    let h = Harness::new();
    let id = h.register("raphael", "pw123").await;
    let token = h.login("raphael", "pw123").await.unwrap();

    let err = h
        .service
        .change_password(id, "wrong".to_string(), "pw456".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));

    // Nothing changed
    assert!(h.service.authenticate(&token).await.is_ok());
    assert!(h.login("raphael", "pw123").await.is_ok());
}

#[tokio::test]
async fn test_login_failures_look_identical() {
    let h = Harness::new();
    h.register("raphael", "pw123").await;

    let wrong_password = h.login("raphael", "nope!").await.unwrap_err();
    let unknown_user = h.login("nobody", "pw123").await.unwrap_err();

    assert!(matches!(wrong_password, AppError::InvalidCredentials));
    assert!(matches!(unknown_user, AppError::InvalidCredentials));
    assert_eq!(wrong_password.user_message(), unknown_user.user_message());
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn test_usernames_are_case_sensitive() {
    let h = Harness::new();
    h.register("raphael", "pw123").await;

    assert!(h.login("Raphael", "pw123").await.is_err());
    assert!(h.login(" raphael ", "pw123").await.is_ok());
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let h = Harness::new();
    h.register("raphael", "pw123").await;

    let err = h
        .service
        .register(
            "raphael".to_string(),
            "other@example.com".to_string(),
            "pw123".to_string(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = h
        .service
        .register(
            "someone".to_string(),
            "RAPHAEL@example.com".to_string(),
            "pw123".to_string(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_deactivated_identity_cannot_log_in() {
    let h = Harness::new();
    let id = h.register("raphael", "pw123").await;
    let token = h.login("raphael", "pw123").await.unwrap();

    h.service.deactivate(id).await.unwrap();

    assert!(h.service.authenticate(&token).await.is_err());
    assert!(matches!(
        h.login("raphael", "pw123").await,
        Err(AppError::InvalidCredentials)
    ));
}

#[tokio::test]
async fn test_tokens_survive_key_rotation() {
    let h = Harness::new();
    let id = h.register("raphael", "pw123").await;
    let before = h.login("raphael", "pw123").await.unwrap();

    h.tokens.rotate_key(key("k2"));
    let after = h.login("raphael", "pw123").await.unwrap();

    assert_eq!(h.service.authenticate(&before).await.unwrap(), id);
    assert_eq!(h.service.authenticate(&after).await.unwrap(), id);
}

#[tokio::test]
async fn test_outdated_hash_upgraded_on_login() {
    let weak = HashParams {
        memory_kib: 512,
        iterations: 1,
        parallelism: 1,
    };
    let h = Harness::with_params(weak);
    h.register("raphael", "pw123").await;

    let stronger = authenticator(
        h.identities.clone(),
        h.sessions.clone(),
        h.tokens.clone(),
        fast_params(),
    );
    stronger
        .login("raphael".to_string(), "pw123".to_string())
        .await
        .unwrap();

    let stored = h
        .identities
        .find_by_username("raphael")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.credential.params(), Some(fast_params()));
    assert!(stronger
        .login("raphael".to_string(), "pw123".to_string())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_seed_is_idempotent() {
    let h = Harness::new();
    let seeds = default_seeds("seed-password");

    let first = seed_identities(&h.service, &seeds).await.unwrap();
    assert_eq!(first.created, vec!["raphael".to_string(), "admin".to_string()]);
    assert!(first.skipped.is_empty());

    let second = seed_identities(&h.service, &seeds).await.unwrap();
    assert!(second.created.is_empty());
    assert_eq!(second.skipped.len(), 2);

    assert!(h.login("admin", "seed-password").await.is_ok());
}

/// Session store whose every call fails as unavailable.
struct DownSessionStore;

#[async_trait]
impl SessionStore for DownSessionStore {
    async fn record(&self, _session: &Session) -> AppResult<()> {
        Err(AppError::unavailable("sessions"))
    }
    async fn is_valid(&self, _token_id: Uuid) -> AppResult<bool> {
        Err(AppError::unavailable("sessions"))
    }
    async fn revoke(&self, _token_id: Uuid) -> AppResult<()> {
        Err(AppError::unavailable("sessions"))
    }
    async fn revoke_all(&self, _identity_id: Uuid) -> AppResult<u64> {
        Err(AppError::unavailable("sessions"))
    }
    async fn purge_expired(&self, _cutoff: DateTime<Utc>) -> AppResult<u64> {
        Err(AppError::unavailable("sessions"))
    }
}

#[tokio::test]
async fn test_session_outage_fails_closed() {
    let h = Harness::new();
    h.register("raphael", "pw123").await;
    let token = h.login("raphael", "pw123").await.unwrap();

    let degraded = authenticator(
        h.identities.clone(),
        Arc::new(DownSessionStore),
        h.tokens.clone(),
        fast_params(),
    );

    let err = degraded.authenticate(&token).await.unwrap_err();
    assert!(err.is_unavailable());

    let err = degraded
        .login("raphael".to_string(), "pw123".to_string())
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn test_clock_drives_session_validity() {
    let h = Harness::new();
    h.register("raphael", "pw123").await;
    h.login("raphael", "pw123").await.unwrap();

    h.clock.advance(Duration::hours(2));
    let purged = h.sessions.purge_expired(h.clock.now()).await.unwrap();
    assert_eq!(purged, 1);
    assert!(h.sessions.is_empty());
}
