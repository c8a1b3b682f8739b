//! Identity repository with soft deactivation.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set,
};
use uuid::Uuid;

use super::entities::identity::{self, ActiveModel, Entity as IdentityEntity};
use common::{AppError, AppResult};
use domain::{CredentialHash, Identity, NewIdentity};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Identity repository trait for dependency injection.
///
/// Lookups return deactivated identities too; callers decide what an
/// inactive account may do.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Find identity by exact (case-sensitive) username
    async fn find_by_username(&self, username: &str) -> AppResult<Option<Identity>>;

    /// Find identity by ID
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Identity>>;

    /// Check whether the username or the email is already taken
    async fn exists(&self, username: &str, email: &str) -> AppResult<bool>;

    /// Create a new identity.
    ///
    /// Fails with `Conflict` when the username or email is taken.
    async fn create(&self, identity: NewIdentity) -> AppResult<Identity>;

    /// Replace the stored credential hash
    async fn update_credential(&self, id: Uuid, credential: CredentialHash) -> AppResult<()>;

    /// Soft deactivate (sets deactivated_at). Already inactive is a no-op.
    async fn deactivate(&self, id: Uuid) -> AppResult<()>;
}

/// SeaORM implementation of IdentityRepository
pub struct IdentityStore {
    db: DatabaseConnection,
}

impl IdentityStore {
    /// Create new repository instance
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn taken(&self, column: identity::Column, value: &str) -> AppResult<bool> {
        let count = IdentityEntity::find()
            .filter(column.eq(value))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }
}

#[async_trait]
impl IdentityRepository for IdentityStore {
    async fn find_by_username(&self, username: &str) -> AppResult<Option<Identity>> {
        let result = IdentityEntity::find()
            .filter(identity::Column::Username.eq(username))
            .one(&self.db)
            .await?;

        Ok(result.map(Identity::from))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Identity>> {
        let result = IdentityEntity::find_by_id(id).one(&self.db).await?;
        Ok(result.map(Identity::from))
    }

    async fn exists(&self, username: &str, email: &str) -> AppResult<bool> {
        let count = IdentityEntity::find()
            .filter(
                Condition::any()
                    .add(identity::Column::Username.eq(username))
                    .add(identity::Column::Email.eq(email)),
            )
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn create(&self, new_identity: NewIdentity) -> AppResult<Identity> {
        // Named conflicts for the common case; the unique indexes still
        // catch a concurrent insert and map it to Conflict("Identity").
        if self.taken(identity::Column::Username, &new_identity.username).await? {
            return Err(AppError::conflict("Username"));
        }
        if self.taken(identity::Column::Email, &new_identity.email).await? {
            return Err(AppError::conflict("Email"));
        }

        let now = Utc::now();
        let active_model = ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(new_identity.username),
            email: Set(new_identity.email),
            password_hash: Set(new_identity.credential.into_string()),
            created_at: Set(now),
            updated_at: Set(now),
            deactivated_at: Set(None),
        };

        let model = active_model.insert(&self.db).await?;
        Ok(Identity::from(model))
    }

    async fn update_credential(&self, id: Uuid, credential: CredentialHash) -> AppResult<()> {
        let result = IdentityEntity::update_many()
            .col_expr(
                identity::Column::PasswordHash,
                Expr::value(credential.into_string()),
            )
            .col_expr(identity::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(identity::Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> AppResult<()> {
        let identity = IdentityEntity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;

        if identity.deactivated_at.is_some() {
            return Ok(());
        }

        let mut active: ActiveModel = identity.into();
        let now = Utc::now();
        active.deactivated_at = Set(Some(now));
        active.updated_at = Set(now);

        active.update(&self.db).await?;
        Ok(())
    }
}
