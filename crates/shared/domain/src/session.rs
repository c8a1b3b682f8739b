//! Server-side session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maps an issued token id to its identity so the token can be revoked
/// before it expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token_id: Uuid,
    pub identity_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl Session {
    /// Create a live session for a freshly issued token
    pub fn new(
        token_id: Uuid,
        identity_id: Uuid,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id,
            identity_id,
            issued_at,
            expires_at,
            revoked: false,
        }
    }

    /// Check if the session still authorizes its token at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }

    /// Mark the session revoked. Returns whether this call changed it.
    pub fn revoke(&mut self) -> bool {
        !std::mem::replace(&mut self.revoked, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let session = Session::new(Uuid::new_v4(), Uuid::new_v4(), now, now + Duration::minutes(15));

        assert!(session.is_valid_at(now));
        assert!(session.is_valid_at(now + Duration::minutes(15) - Duration::seconds(1)));
        assert!(!session.is_valid_at(now + Duration::minutes(15)));
    }

    #[test]
    fn test_revoke_is_idempotent() {
        let now = Utc::now();
        let mut session = Session::new(Uuid::new_v4(), Uuid::new_v4(), now, now + Duration::minutes(15));

        assert!(session.revoke());
        assert!(!session.revoke());
        assert!(!session.is_valid_at(now));
    }
}
