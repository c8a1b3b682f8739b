//! Signing key ring with zero-downtime rotation.
//!
//! Exactly one key signs new tokens. Any number of other keys stay trusted
//! for verification, optionally until a retirement deadline; after the
//! deadline (or an explicit revocation) tokens signed with them are refused.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};

use domain::{DomainError, DomainResult, MIN_SIGNING_SECRET_LENGTH};

/// Symmetric signing key material identified by a key id (`kid`).
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    secret: Vec<u8>,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl SigningKey {
    /// Create a signing key.
    ///
    /// # Errors
    /// Rejects an empty key id and secrets shorter than
    /// `MIN_SIGNING_SECRET_LENGTH` bytes.
    pub fn new(kid: impl Into<String>, secret: impl Into<Vec<u8>>) -> DomainResult<Self> {
        let kid = kid.into();
        let secret = secret.into();

        if kid.trim().is_empty() {
            return Err(DomainError::validation("Signing key id must not be empty"));
        }
        if secret.len() < MIN_SIGNING_SECRET_LENGTH {
            return Err(DomainError::validation(format!(
                "Signing key '{}' must be at least {} bytes",
                kid, MIN_SIGNING_SECRET_LENGTH
            )));
        }

        Ok(Self { kid, secret })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }
}

struct TrustedKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
    /// None = trusted until explicitly revoked
    retire_at: Option<DateTime<Utc>>,
}

impl From<&SigningKey> for TrustedKey {
    fn from(key: &SigningKey) -> Self {
        Self {
            encoding: EncodingKey::from_secret(&key.secret),
            decoding: DecodingKey::from_secret(&key.secret),
            retire_at: None,
        }
    }
}

/// Active signing key plus the set of keys currently trusted for verification.
pub struct KeyRing {
    active: String,
    keys: HashMap<String, TrustedKey>,
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("active", &self.active)
            .field("trusted", &self.trusted_kids())
            .finish()
    }
}

impl KeyRing {
    /// Create a ring that signs with `active`.
    pub fn new(active: SigningKey) -> Self {
        let mut keys = HashMap::new();
        keys.insert(active.kid.clone(), TrustedKey::from(&active));
        Self {
            active: active.kid,
            keys,
        }
    }

    /// Trust an additional key for verification only.
    pub fn trust(&mut self, key: SigningKey) {
        if key.kid == self.active {
            return;
        }
        self.keys.insert(key.kid.clone(), TrustedKey::from(&key));
    }

    /// Make `next` the signing key. The previous active key stays trusted
    /// until `retire_previous_at`.
    pub fn rotate(&mut self, next: SigningKey, retire_previous_at: DateTime<Utc>) {
        if next.kid != self.active {
            if let Some(previous) = self.keys.get_mut(&self.active) {
                previous.retire_at = Some(retire_previous_at);
            }
        }

        self.keys.insert(next.kid.clone(), TrustedKey::from(&next));
        self.active = next.kid;
    }

    /// Stop trusting a key immediately. The active key cannot be revoked;
    /// rotate away from it first.
    pub fn revoke(&mut self, kid: &str) -> bool {
        if kid == self.active {
            return false;
        }
        self.keys.remove(kid).is_some()
    }

    /// Drop keys whose retirement deadline has passed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.keys.len();
        self.keys
            .retain(|_, key| key.retire_at.map_or(true, |retire_at| now < retire_at));
        before - self.keys.len()
    }

    pub fn active_kid(&self) -> &str {
        &self.active
    }

    /// Ids of every key currently in the ring, sorted.
    pub fn trusted_kids(&self) -> Vec<String> {
        let mut kids: Vec<String> = self.keys.keys().cloned().collect();
        kids.sort();
        kids
    }

    pub(crate) fn signing_key(&self) -> Option<(&str, &EncodingKey)> {
        self.keys
            .get(&self.active)
            .map(|key| (self.active.as_str(), &key.encoding))
    }

    /// Verification key for `kid`, unless unknown or retired at `now`.
    pub(crate) fn verification_key(&self, kid: &str, now: DateTime<Utc>) -> Option<&DecodingKey> {
        self.keys
            .get(kid)
            .filter(|key| key.retire_at.map_or(true, |retire_at| now < retire_at))
            .map(|key| &key.decoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(kid: &str) -> SigningKey {
        SigningKey::new(kid, format!("{}-secret-material-at-least-32-bytes", kid)).unwrap()
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(SigningKey::new("k1", "short").is_err());
        assert!(SigningKey::new("", "x".repeat(32)).is_err());
    }

    #[test]
    fn test_rotate_keeps_previous_until_deadline() {
        let now = Utc::now();
        let mut ring = KeyRing::new(key("k1"));
        ring.rotate(key("k2"), now + Duration::minutes(15));

        assert_eq!(ring.active_kid(), "k2");
        assert!(ring.verification_key("k1", now).is_some());
        assert!(ring.verification_key("k1", now + Duration::minutes(15)).is_none());
        assert!(ring.verification_key("k2", now + Duration::days(365)).is_some());

        assert_eq!(ring.prune(now + Duration::minutes(16)), 1);
        assert_eq!(ring.trusted_kids(), vec!["k2".to_string()]);
    }

    #[test]
    fn test_revoke() {
        let mut ring = KeyRing::new(key("k1"));
        ring.trust(key("old"));

        assert!(!ring.revoke("k1"));
        assert!(ring.revoke("old"));
        assert!(!ring.revoke("old"));
        assert!(ring.verification_key("old", Utc::now()).is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let output = format!("{:?}", key("k1"));
        assert!(output.contains("k1"));
        assert!(!output.contains("secret-material"));
    }
}
