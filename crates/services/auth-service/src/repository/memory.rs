//! Process-local identity repository for tests and development.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use super::IdentityRepository;
use common::{AppError, AppResult};
use domain::{CredentialHash, Identity, NewIdentity};

/// Identities kept in a map behind a lock.
#[derive(Default)]
pub struct InMemoryIdentityRepository {
    identities: RwLock<HashMap<Uuid, Identity>>,
}

impl InMemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityRepository for InMemoryIdentityRepository {
    async fn find_by_username(&self, username: &str) -> AppResult<Option<Identity>> {
        let identities = self.identities.read().unwrap_or_else(PoisonError::into_inner);
        Ok(identities
            .values()
            .find(|identity| identity.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Identity>> {
        let identities = self.identities.read().unwrap_or_else(PoisonError::into_inner);
        Ok(identities.get(&id).cloned())
    }

    async fn exists(&self, username: &str, email: &str) -> AppResult<bool> {
        let identities = self.identities.read().unwrap_or_else(PoisonError::into_inner);
        Ok(identities
            .values()
            .any(|identity| identity.username == username || identity.email == email))
    }

    async fn create(&self, new_identity: NewIdentity) -> AppResult<Identity> {
        let mut identities = self.identities.write().unwrap_or_else(PoisonError::into_inner);

        if identities
            .values()
            .any(|identity| identity.username == new_identity.username)
        {
            return Err(AppError::conflict("Username"));
        }
        if identities
            .values()
            .any(|identity| identity.email == new_identity.email)
        {
            return Err(AppError::conflict("Email"));
        }

        let identity = Identity::new(
            Uuid::new_v4(),
            new_identity.username,
            new_identity.email,
            new_identity.credential,
        );
        identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn update_credential(&self, id: Uuid, credential: CredentialHash) -> AppResult<()> {
        let mut identities = self.identities.write().unwrap_or_else(PoisonError::into_inner);
        let identity = identities.get_mut(&id).ok_or(AppError::NotFound)?;
        identity.change_credential(credential);
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> AppResult<()> {
        let mut identities = self.identities.write().unwrap_or_else(PoisonError::into_inner);
        let identity = identities.get_mut(&id).ok_or(AppError::NotFound)?;
        if identity.is_active() {
            identity.deactivate();
        }
        Ok(())
    }
}
