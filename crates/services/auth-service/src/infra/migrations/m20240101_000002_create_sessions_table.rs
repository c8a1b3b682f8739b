//! Migration: Create sessions table.

use sea_orm_migration::prelude::*;

use super::m20240101_000001_create_identities_table::Identities;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Sessions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Sessions::TokenId).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Sessions::IdentityId).uuid().not_null())
                    .col(
                        ColumnDef::new(Sessions::IssuedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Sessions::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Sessions::Revoked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sessions_identity_id")
                            .from(Sessions::Table, Sessions::IdentityId)
                            .to(Identities::Table, Identities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // revoke_all filters by identity
        manager
            .create_index(
                Index::create()
                    .name("idx_sessions_identity_id")
                    .table(Sessions::Table)
                    .col(Sessions::IdentityId)
                    .to_owned(),
            )
            .await?;

        // purge_expired filters by expiry
        manager
            .create_index(
                Index::create()
                    .name("idx_sessions_expires_at")
                    .table(Sessions::Table)
                    .col(Sessions::ExpiresAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Sessions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Sessions {
    Table,
    TokenId,
    IdentityId,
    IssuedAt,
    ExpiresAt,
    Revoked,
}
