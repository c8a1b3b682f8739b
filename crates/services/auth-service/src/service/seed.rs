//! Explicit, idempotent seeding of initial identities.

use tracing::info;

use common::{AppError, AppResult};

use super::AuthService;

/// An identity to create if its username is still free.
#[derive(Clone)]
pub struct SeedIdentity {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for SeedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedIdentity")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Outcome of a seed run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub created: Vec<String>,
    pub skipped: Vec<String>,
}

/// The two standard accounts, sharing an operator-supplied password.
pub fn default_seeds(password: &str) -> Vec<SeedIdentity> {
    [("raphael", "raphael@example.com"), ("admin", "admin@example.com")]
        .into_iter()
        .map(|(username, email)| SeedIdentity {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        })
        .collect()
}

/// Register every seed whose username or email is not taken yet.
///
/// Runs through the normal registration path, so passwords are validated
/// and hashed exactly like user-supplied ones.
pub async fn seed_identities(
    service: &dyn AuthService,
    seeds: &[SeedIdentity],
) -> AppResult<SeedReport> {
    let mut report = SeedReport::default();

    for seed in seeds {
        match service
            .register(
                seed.username.clone(),
                seed.email.clone(),
                seed.password.clone(),
            )
            .await
        {
            Ok(identity) => {
                info!(identity_id = %identity.id, username = %identity.username, "Seeded identity");
                report.created.push(seed.username.clone());
            }
            Err(AppError::Conflict(_)) => {
                info!(username = %seed.username, "Seed skipped: already exists");
                report.skipped.push(seed.username.clone());
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}
