//! Session store backed by the `sessions` table.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use common::AppResult;
use domain::Session;

use super::SessionStore;
use crate::clock::Clock;
use crate::repository::entities::session::{self, ActiveModel, Entity as SessionEntity};

/// SeaORM implementation of SessionStore.
///
/// Every operation is a single statement, so concurrent record/revoke
/// calls never lose an update.
pub struct DbSessionStore {
    db: DatabaseConnection,
    clock: Arc<dyn Clock>,
}

impl DbSessionStore {
    pub fn new(db: DatabaseConnection, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

#[async_trait]
impl SessionStore for DbSessionStore {
    async fn record(&self, session: &Session) -> AppResult<()> {
        let model = ActiveModel {
            token_id: Set(session.token_id),
            identity_id: Set(session.identity_id),
            issued_at: Set(session.issued_at),
            expires_at: Set(session.expires_at),
            revoked: Set(session.revoked),
        };

        // `revoked` is not in the update list: a conflict keeps the stored flag
        SessionEntity::insert(model)
            .on_conflict(
                OnConflict::column(session::Column::TokenId)
                    .update_columns([
                        session::Column::IdentityId,
                        session::Column::IssuedAt,
                        session::Column::ExpiresAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn is_valid(&self, token_id: Uuid) -> AppResult<bool> {
        let found = SessionEntity::find_by_id(token_id).one(&self.db).await?;
        let now = self.clock.now();
        Ok(found.is_some_and(|model| Session::from(model).is_valid_at(now)))
    }

    async fn revoke(&self, token_id: Uuid) -> AppResult<()> {
        SessionEntity::update_many()
            .col_expr(session::Column::Revoked, Expr::value(true))
            .filter(session::Column::TokenId.eq(token_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn revoke_all(&self, identity_id: Uuid) -> AppResult<u64> {
        let result = SessionEntity::update_many()
            .col_expr(session::Column::Revoked, Expr::value(true))
            .filter(session::Column::IdentityId.eq(identity_id))
            .filter(session::Column::Revoked.eq(false))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = SessionEntity::delete_many()
            .filter(session::Column::ExpiresAt.lt(cutoff))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
