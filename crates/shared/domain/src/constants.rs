//! Domain-level constants.
//!
//! These constants define credential, token and session rules.

// =============================================================================
// Validation
// =============================================================================

/// Minimum password length requirement
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Minimum username length
pub const MIN_USERNAME_LENGTH: usize = 3;

/// Maximum username length
pub const MAX_USERNAME_LENGTH: usize = 64;

/// Check if a username only uses the allowed character set
pub fn is_valid_username(username: &str) -> bool {
    (MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&username.chars().count())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

// =============================================================================
// Credential Hashing (Argon2id)
// =============================================================================

/// Default Argon2 memory cost in KiB (OWASP baseline)
pub const DEFAULT_HASH_MEMORY_KIB: u32 = 19_456;

/// Default Argon2 iteration count
pub const DEFAULT_HASH_ITERATIONS: u32 = 2;

/// Default Argon2 degree of parallelism
pub const DEFAULT_HASH_PARALLELISM: u32 = 1;

// =============================================================================
// Authentication
// =============================================================================

/// Default access token lifetime in minutes
pub const DEFAULT_TOKEN_LIFETIME_MINUTES: i64 = 15;

/// Default token issuer claim
pub const DEFAULT_TOKEN_ISSUER: &str = "auth-service";

/// Minimum signing secret length (security requirement)
pub const MIN_SIGNING_SECRET_LENGTH: usize = 32;

/// Token type identifier
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

// =============================================================================
// Sessions
// =============================================================================

/// How long expired sessions are retained before the sweeper deletes them
pub const DEFAULT_SESSION_RETENTION_SECONDS: i64 = 86_400;
