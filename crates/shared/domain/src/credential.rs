//! Credential hashing - salted, memory-hard password hashes.
//!
//! DDD: `CredentialHash` is an immutable value object holding a PHC string
//! (`$argon2id$v=19$m=19456,t=2,p=1$<salt>$<hash>`). The string carries the
//! algorithm, version, cost parameters and salt, so a stored hash can always
//! be verified with the parameters it was produced with, even after the
//! hasher has been re-tuned.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::constants::{DEFAULT_HASH_ITERATIONS, DEFAULT_HASH_MEMORY_KIB, DEFAULT_HASH_PARALLELISM};
use crate::error::{DomainError, DomainResult};

/// PHC identifier of the algorithm new hashes are produced with.
const CURRENT_ALGORITHM: &str = "argon2id";

/// Tunable Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes over memory
    pub iterations: u32,
    /// Degree of parallelism (lanes)
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_HASH_MEMORY_KIB,
            iterations: DEFAULT_HASH_ITERATIONS,
            parallelism: DEFAULT_HASH_PARALLELISM,
        }
    }
}

/// Self-describing stored credential.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialHash(String);

// Never expose the hash in debug output
impl std::fmt::Debug for CredentialHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CredentialHash").field(&"[REDACTED]").finish()
    }
}

impl CredentialHash {
    /// Wrap a PHC string loaded from storage.
    ///
    /// No parsing happens here: a malformed value simply never verifies.
    pub fn from_phc(phc: impl Into<String>) -> Self {
        Self(phc.into())
    }

    /// Get the PHC string for storage.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the PHC string.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Algorithm identifier embedded in the hash, if it parses.
    pub fn algorithm(&self) -> Option<String> {
        PasswordHash::new(&self.0)
            .ok()
            .map(|parsed| parsed.algorithm.as_str().to_string())
    }

    /// Cost parameters embedded in the hash, if it parses.
    pub fn params(&self) -> Option<HashParams> {
        let parsed = PasswordHash::new(&self.0).ok()?;
        Some(HashParams {
            memory_kib: parsed.params.get_decimal("m")?,
            iterations: parsed.params.get_decimal("t")?,
            parallelism: parsed.params.get_decimal("p")?,
        })
    }
}

impl From<CredentialHash> for String {
    fn from(hash: CredentialHash) -> Self {
        hash.0
    }
}

/// Produces and verifies credential hashes with a fixed cost configuration.
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    params: HashParams,
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("params", &self.params)
            .finish()
    }
}

impl CredentialHasher {
    /// Create a hasher with the given cost parameters.
    ///
    /// # Errors
    /// Returns a validation error if Argon2 rejects the parameters
    /// (e.g. memory below `8 * parallelism` KiB).
    pub fn new(params: HashParams) -> DomainResult<Self> {
        let argon2_params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            None,
        )
        .map_err(|e| DomainError::validation(format!("Invalid hash parameters: {}", e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params),
            params,
        })
    }

    /// Current cost parameters.
    pub fn params(&self) -> HashParams {
        self.params
    }

    /// Hash a plaintext password with a fresh random salt.
    ///
    /// # Errors
    /// Rejects empty input. The salt comes from the OS entropy source; a
    /// failing entropy source aborts rather than producing a weak salt.
    pub fn hash(&self, plaintext: &str) -> DomainResult<CredentialHash> {
        if plaintext.is_empty() {
            return Err(DomainError::validation("Password must not be empty"));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| DomainError::internal(format!("Password hash failed: {}", e)))?;

        Ok(CredentialHash(hash.to_string()))
    }

    /// Verify a plaintext candidate against a stored hash.
    ///
    /// The derived bytes are compared in constant time. A stored value that
    /// does not parse yields `false`, never an error.
    pub fn verify(&self, plaintext: &str, stored: &CredentialHash) -> bool {
        let Ok(parsed) = PasswordHash::new(stored.as_str()) else {
            return false;
        };

        // Argon2 re-derives with the algorithm and params stored in `parsed`
        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// Whether a stored hash should be replaced with one produced by the
    /// current algorithm and parameters.
    pub fn needs_rehash(&self, stored: &CredentialHash) -> bool {
        let Ok(parsed) = PasswordHash::new(stored.as_str()) else {
            return true;
        };

        if parsed.algorithm.as_str() != CURRENT_ALGORITHM
            || parsed.version != Some(Version::V0x13 as u32)
        {
            return true;
        }

        stored.params() != Some(self.params)
    }
}
