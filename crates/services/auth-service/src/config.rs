//! Auth service configuration.

use std::time::Duration;

use thiserror::Error;

use common::{env_parse, env_var, DatabaseConfig};
use domain::{
    HashParams, DEFAULT_HASH_ITERATIONS, DEFAULT_HASH_MEMORY_KIB, DEFAULT_HASH_PARALLELISM,
    DEFAULT_SESSION_RETENTION_SECONDS, DEFAULT_TOKEN_ISSUER, DEFAULT_TOKEN_LIFETIME_MINUTES,
    MIN_PASSWORD_LENGTH,
};

use crate::token::{KeyRing, SigningKey};

/// Key id given to a key supplied through `JWT_SECRET`.
pub const LEGACY_KEY_ID: &str = "default";

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No signing key configured: set AUTH_SIGNING_KEYS or JWT_SECRET")]
    MissingSigningKey,

    #[error("Invalid signing key entry '{0}': expected kid:secret")]
    InvalidKeyEntry(String),

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Active key id '{0}' is not among the configured signing keys")]
    UnknownActiveKey(String),

    #[error("Unknown session backend '{0}': expected 'database' or 'memory'")]
    UnknownSessionBackend(String),

    #[error("Invalid {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        reason: &'static str,
    },
}

/// Where session records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// PostgreSQL `sessions` table
    Database,
    /// Process memory (single node, lost on restart)
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" | "db" | "postgres" => Ok(Self::Database),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(ConfigError::UnknownSessionBackend(other.to_string())),
        }
    }
}

/// Auth service configuration.
#[derive(Clone)]
pub struct AuthServiceConfig {
    pub database: DatabaseConfig,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Signing keys; the first entry signs unless `active_key_id` says otherwise
    pub signing_keys: Vec<SigningKey>,
    pub active_key_id: Option<String>,
    pub token_issuer: String,
    pub token_lifetime: chrono::Duration,
    pub hash_params: HashParams,
    pub hash_workers: usize,
    pub min_password_length: usize,
    pub session_backend: StorageBackend,
    /// Upper bound for one session store call
    pub session_timeout: Duration,
    pub session_retry_backoff: Duration,
    /// How long expired sessions are kept before the sweeper deletes them
    pub session_retention: chrono::Duration,
    pub session_sweep_interval: Duration,
}

// Secrets stay out of logs
impl std::fmt::Debug for AuthServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kids: Vec<&str> = self.signing_keys.iter().map(SigningKey::kid).collect();
        f.debug_struct("AuthServiceConfig")
            .field("database_url", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("signing_keys", &kids)
            .field("active_key_id", &self.active_key_id)
            .field("token_issuer", &self.token_issuer)
            .field("token_lifetime", &self.token_lifetime)
            .field("hash_params", &self.hash_params)
            .field("hash_workers", &self.hash_workers)
            .field("min_password_length", &self.min_password_length)
            .field("session_backend", &self.session_backend)
            .field("session_timeout", &self.session_timeout)
            .finish_non_exhaustive()
    }
}

impl AuthServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let signing_keys = match env_var(&["AUTH_SIGNING_KEYS"]) {
            Some(raw) => parse_signing_keys(&raw)?,
            None => {
                let secret = env_var(&["JWT_SECRET", "AUTH_SERVICE_JWT_SECRET"])
                    .ok_or(ConfigError::MissingSigningKey)?;
                vec![SigningKey::new(LEGACY_KEY_ID, secret)
                    .map_err(|e| ConfigError::InvalidKey(e.to_string()))?]
            }
        };

        let session_backend = match env_var(&["AUTH_SESSION_BACKEND"]) {
            Some(raw) => raw.parse()?,
            None => StorageBackend::Database,
        };

        let defaults = DatabaseConfig::default();
        let database = DatabaseConfig {
            url: env_var(&["AUTH_SERVICE_DATABASE_URL", "DATABASE_URL"]).unwrap_or(defaults.url),
            max_connections: env_parse(
                &["AUTH_SERVICE_DB_MAX_CONNECTIONS"],
                defaults.max_connections,
            ),
            min_connections: env_parse(
                &["AUTH_SERVICE_DB_MIN_CONNECTIONS"],
                defaults.min_connections,
            ),
        };

        Ok(Self {
            database,
            host: env_var(&["AUTH_SERVICE_HOST"]).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_parse(&["AUTH_SERVICE_PORT"], 50051),
            signing_keys,
            active_key_id: env_var(&["AUTH_ACTIVE_KEY_ID"]),
            token_issuer: env_var(&["AUTH_TOKEN_ISSUER"])
                .unwrap_or_else(|| DEFAULT_TOKEN_ISSUER.to_string()),
            token_lifetime: token_lifetime(env_parse(
                &["AUTH_TOKEN_LIFETIME_MINUTES"],
                DEFAULT_TOKEN_LIFETIME_MINUTES,
            ))?,
            hash_params: HashParams {
                memory_kib: env_parse(&["AUTH_HASH_MEMORY_KIB"], DEFAULT_HASH_MEMORY_KIB),
                iterations: env_parse(&["AUTH_HASH_ITERATIONS"], DEFAULT_HASH_ITERATIONS),
                parallelism: env_parse(&["AUTH_HASH_PARALLELISM"], DEFAULT_HASH_PARALLELISM),
            },
            hash_workers: non_zero("AUTH_HASH_WORKERS", env_parse(&["AUTH_HASH_WORKERS"], 4))?,
            min_password_length: env_parse(&["AUTH_MIN_PASSWORD_LENGTH"], MIN_PASSWORD_LENGTH),
            session_backend,
            session_timeout: Duration::from_millis(non_zero(
                "AUTH_SESSION_TIMEOUT_MS",
                env_parse(&["AUTH_SESSION_TIMEOUT_MS"], 500),
            )?),
            session_retry_backoff: Duration::from_millis(env_parse(
                &["AUTH_SESSION_RETRY_BACKOFF_MS"],
                50,
            )),
            session_retention: session_retention(env_parse(
                &["AUTH_SESSION_RETENTION_SECONDS"],
                DEFAULT_SESSION_RETENTION_SECONDS,
            ))?,
            session_sweep_interval: Duration::from_secs(non_zero(
                "AUTH_SESSION_SWEEP_SECONDS",
                env_parse(&["AUTH_SESSION_SWEEP_SECONDS"], 300),
            )?),
        })
    }

    /// Build the key ring: the active key signs, every other key verifies.
    pub fn key_ring(&self) -> Result<KeyRing, ConfigError> {
        let active = match &self.active_key_id {
            Some(kid) => self
                .signing_keys
                .iter()
                .find(|key| key.kid() == kid)
                .ok_or_else(|| ConfigError::UnknownActiveKey(kid.clone()))?,
            None => self
                .signing_keys
                .first()
                .ok_or(ConfigError::MissingSigningKey)?,
        };

        let mut ring = KeyRing::new(active.clone());
        for key in &self.signing_keys {
            ring.trust(key.clone());
        }
        Ok(ring)
    }
}

/// Parse `kid:secret,kid:secret`. Whitespace around entries is ignored.
pub fn parse_signing_keys(raw: &str) -> Result<Vec<SigningKey>, ConfigError> {
    let keys = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (kid, secret) = entry
                .split_once(':')
                .ok_or_else(|| ConfigError::InvalidKeyEntry(redact_entry(entry)))?;
            SigningKey::new(kid.trim(), secret.trim())
                .map_err(|e| ConfigError::InvalidKey(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if keys.is_empty() {
        return Err(ConfigError::MissingSigningKey);
    }
    Ok(keys)
}

fn token_lifetime(minutes: i64) -> Result<chrono::Duration, ConfigError> {
    const NAME: &str = "AUTH_TOKEN_LIFETIME_MINUTES";
    if minutes <= 0 {
        return Err(ConfigError::InvalidValue {
            name: NAME,
            reason: "must be positive",
        });
    }
    chrono::Duration::try_minutes(minutes).ok_or(ConfigError::InvalidValue {
        name: NAME,
        reason: "out of range",
    })
}

fn session_retention(seconds: i64) -> Result<chrono::Duration, ConfigError> {
    const NAME: &str = "AUTH_SESSION_RETENTION_SECONDS";
    if seconds < 0 {
        return Err(ConfigError::InvalidValue {
            name: NAME,
            reason: "must not be negative",
        });
    }
    chrono::Duration::try_seconds(seconds).ok_or(ConfigError::InvalidValue {
        name: NAME,
        reason: "out of range",
    })
}

fn non_zero<T: Default + PartialEq>(name: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            name,
            reason: "must be greater than zero",
        });
    }
    Ok(value)
}

// An entry without ':' may be a bare secret
fn redact_entry(entry: &str) -> String {
    format!("{}…", entry.chars().take(2).collect::<String>())
}
