//! Identity database entity for SeaORM.

use sea_orm::entity::prelude::*;

use domain::{CredentialHash, Identity};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "identities")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
    /// Self-describing PHC string (algorithm, parameters, salt, digest)
    pub password_hash: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    /// NULL = active
    pub deactivated_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::session::Entity")]
    Sessions,
}

impl Related<super::session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Identity {
    fn from(model: Model) -> Self {
        Identity {
            id: model.id,
            username: model.username,
            email: model.email,
            credential: CredentialHash::from_phc(model.password_hash),
            created_at: model.created_at,
            updated_at: model.updated_at,
            deactivated_at: model.deactivated_at,
        }
    }
}
