//! Domain-level errors.
//!
//! These errors represent business rule violations and domain logic failures.
//! They are independent of infrastructure concerns (HTTP, gRPC, database).

use thiserror::Error;

/// Domain-specific errors for business rule violations.
#[derive(Error, Debug, Clone)]
pub enum DomainError {
    /// Validation failed for a field or input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal domain error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        DomainError::Internal(msg.into())
    }
}

/// Reasons a presented token is rejected.
///
/// The distinction is kept internally (and logged) so callers can decide
/// between prompting a re-login and refreshing silently. External callers
/// only ever see a generic "unauthenticated" answer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// The token could not be parsed or its claims are not well formed
    #[error("malformed token")]
    Malformed,

    /// The token was well formed and correctly signed but is past its expiry
    #[error("token expired")]
    Expired,

    /// The signature does not match, or the signing key is not trusted
    #[error("invalid token signature")]
    InvalidSignature,
}

/// Result type alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
