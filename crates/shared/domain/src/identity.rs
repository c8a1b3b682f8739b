//! Identity domain entity and related types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credential::CredentialHash;

/// A registered account.
///
/// Identities are never hard-deleted; `deactivated_at` marks an account
/// that can no longer authenticate while keeping its audit trail.
#[derive(Clone)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub credential: CredentialHash,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft deactivation timestamp (None = active)
    pub deactivated_at: Option<DateTime<Utc>>,
}

// Credential stays out of logs even in redacted form
impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("created_at", &self.created_at)
            .field("deactivated_at", &self.deactivated_at)
            .finish_non_exhaustive()
    }
}

impl Identity {
    /// Create a new active identity
    pub fn new(id: Uuid, username: String, email: String, credential: CredentialHash) -> Self {
        let now = Utc::now();
        Self {
            id,
            username,
            email,
            credential,
            created_at: now,
            updated_at: now,
            deactivated_at: None,
        }
    }

    /// Check if identity may still authenticate
    pub fn is_active(&self) -> bool {
        self.deactivated_at.is_none()
    }

    /// Replace the stored credential
    pub fn change_credential(&mut self, credential: CredentialHash) {
        self.credential = credential;
        self.updated_at = Utc::now();
    }

    /// Soft-deactivate the identity
    pub fn deactivate(&mut self) {
        let now = Utc::now();
        self.deactivated_at = Some(now);
        self.updated_at = now;
    }
}

/// Identity creation data (credential already hashed)
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub username: String,
    pub email: String,
    pub credential: CredentialHash,
}

/// Identity response (safe to return to client)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct IdentityResponse {
    /// Unique identity identifier
    pub id: Uuid,
    /// Login name
    pub username: String,
    /// Email address
    pub email: String,
    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
}

impl From<&Identity> for IdentityResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            created_at: identity.created_at,
        }
    }
}

impl From<Identity> for IdentityResponse {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username,
            email: identity.email,
            created_at: identity.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::new(
            Uuid::new_v4(),
            "raphael".to_string(),
            "raphael@example.com".to_string(),
            CredentialHash::from_phc("$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA"),
        )
    }

    #[test]
    fn test_deactivate() {
        let mut identity = identity();
        assert!(identity.is_active());

        identity.deactivate();
        assert!(!identity.is_active());
        assert!(identity.updated_at >= identity.created_at);
    }

    #[test]
    fn test_debug_omits_credential() {
        let output = format!("{:?}", identity());
        assert!(output.contains("raphael"));
        assert!(!output.contains("argon2id"));
        assert!(!output.contains("credential"));
    }
}
