use sea_orm::entity::prelude::*;

use crate::domain::Role;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Trimmed, case-sensitive
    #[sea_orm(unique)]
    pub username: String,

    /// Stored lowercase
    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id PHC string
    pub password_hash: String,

    pub role: Role,

    pub first_name: Option<String>,

    pub last_name: Option<String>,

    pub organization: Option<String>,

    pub phone: Option<String>,

    pub predictions_made: i64,

    pub models_trained: i64,

    pub last_active: Option<DateTimeUtc>,

    pub default_model: Option<String>,

    /// Channel name -> enabled
    pub notification_settings: Option<Json>,

    pub api_key: Option<String>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
