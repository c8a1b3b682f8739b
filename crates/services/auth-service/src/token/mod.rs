//! Signed access tokens and the keys that sign them.

mod issuer;
mod keys;

pub use issuer::{Claims, IssuedToken, TokenIssuer, TokenResponse, VerifiedToken};
pub use keys::{KeyRing, SigningKey};
