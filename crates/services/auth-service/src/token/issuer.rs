//! Access token issuance and verification.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, errors::ErrorKind, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use common::{AppError, AppResult};
use domain::{Session, TokenError, TOKEN_TYPE_BEARER};

use super::keys::{KeyRing, SigningKey};
use crate::clock::Clock;

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// Token claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Identity the token was issued to
    pub sub: Uuid,
    /// Unique token id, key of the server-side session
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// A freshly signed token and the facts needed to record its session.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: Uuid,
    pub identity_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    /// Session record for this token
    pub fn session(&self) -> Session {
        Session::new(self.token_id, self.identity_id, self.issued_at, self.expires_at)
    }

    /// Lifetime in seconds
    pub fn expires_in(&self) -> i64 {
        (self.expires_at - self.issued_at).num_seconds()
    }
}

/// Token response returned after successful authentication
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    /// Signed access token
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Token expiration time in seconds
    pub expires_in: i64,
}

impl From<&IssuedToken> for TokenResponse {
    fn from(issued: &IssuedToken) -> Self {
        Self {
            access_token: issued.token.clone(),
            token_type: TOKEN_TYPE_BEARER.to_string(),
            expires_in: issued.expires_in(),
        }
    }
}

/// Facts extracted from a token whose signature and expiry checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub identity_id: Uuid,
    pub token_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies access tokens.
///
/// Verification is pure computation: it never consults the session store,
/// so a verified token may still belong to a revoked session.
pub struct TokenIssuer {
    keys: RwLock<KeyRing>,
    lifetime: Duration,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// Create a new issuer.
    pub fn new(
        keys: KeyRing,
        lifetime: Duration,
        issuer: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            keys: RwLock::new(keys),
            lifetime,
            issuer: issuer.into(),
            clock,
        }
    }

    /// Fixed lifetime of every issued token
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    fn read_keys(&self) -> RwLockReadGuard<'_, KeyRing> {
        self.keys.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_keys(&self) -> RwLockWriteGuard<'_, KeyRing> {
        self.keys.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sign a new token for `identity_id` with the active key.
    pub fn issue(&self, identity_id: Uuid) -> AppResult<IssuedToken> {
        let iat = self.clock.now().timestamp();
        let exp = iat + self.lifetime.num_seconds();
        let claims = Claims {
            sub: identity_id,
            jti: Uuid::new_v4(),
            iat,
            exp,
            iss: self.issuer.clone(),
        };

        let token = {
            let keys = self.read_keys();
            let (kid, encoding_key) = keys
                .signing_key()
                .ok_or_else(|| AppError::internal("No active signing key"))?;

            let mut header = Header::new(SIGNING_ALGORITHM);
            header.kid = Some(kid.to_string());

            encode(&header, &claims, encoding_key)
                .map_err(|e| AppError::internal(format!("Token signing failed: {}", e)))?
        };

        Ok(IssuedToken {
            token,
            token_id: claims.jti,
            identity_id,
            issued_at: timestamp(iat).ok_or_else(|| AppError::internal("Invalid issue time"))?,
            expires_at: timestamp(exp).ok_or_else(|| AppError::internal("Invalid expiry time"))?,
        })
    }

    /// Check a presented token's structure, signature, issuer and expiry.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        let header = decode_header(token).map_err(|_| TokenError::Malformed)?;
        if header.alg != SIGNING_ALGORITHM {
            return Err(TokenError::InvalidSignature);
        }
        let kid = header.kid.ok_or(TokenError::Malformed)?;

        let now = self.clock.now();
        let decoding_key = self
            .read_keys()
            .verification_key(&kid, now)
            .cloned()
            .ok_or(TokenError::InvalidSignature)?;

        let mut validation = Validation::new(SIGNING_ALGORITHM);
        // Expiry is checked below against the injected clock
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let claims = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    TokenError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })?
            .claims;

        if claims.iat > claims.exp {
            return Err(TokenError::Malformed);
        }
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(VerifiedToken {
            identity_id: claims.sub,
            token_id: claims.jti,
            issued_at: timestamp(claims.iat).ok_or(TokenError::Malformed)?,
            expires_at: timestamp(claims.exp).ok_or(TokenError::Malformed)?,
        })
    }

    /// Switch signing to `next`. The previous key stays trusted for one token
    /// lifetime so every token it signed can run to expiry.
    pub fn rotate_key(&self, next: SigningKey) {
        let retire_at = self.clock.now() + self.lifetime;
        let mut keys = self.write_keys();
        let previous = keys.active_kid().to_string();
        keys.rotate(next, retire_at);
        info!(
            previous = %previous,
            active = %keys.active_kid(),
            retire_at = %retire_at,
            "Signing key rotated"
        );
    }

    /// Stop trusting a key immediately (e.g. after compromise).
    pub fn revoke_key(&self, kid: &str) -> bool {
        let revoked = self.write_keys().revoke(kid);
        if revoked {
            warn!(kid = %kid, "Signing key revoked");
        }
        revoked
    }

    /// Forget keys whose retirement deadline has passed.
    pub fn prune_retired_keys(&self) -> usize {
        let now = self.clock.now();
        self.write_keys().prune(now)
    }

    /// Key id currently used for signing
    pub fn active_kid(&self) -> String {
        self.read_keys().active_kid().to_string()
    }
}

fn timestamp(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}
