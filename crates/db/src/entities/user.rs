//! User entity.
//!
//! Only the addressing columns live here; the account itself is managed
//! elsewhere and attachments point at it by id.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub username: String,

    pub username_lower: String,

    /// NULL = local user, Some(host) = remote user
    #[sea_orm(nullable)]
    pub host: Option<String>,

    /// `ActivityPub` actor URI
    #[sea_orm(nullable)]
    pub uri: Option<String>,

    /// Suspended users cannot be mentioned
    #[sea_orm(default_value = false)]
    pub is_suspended: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::media_attachment::Entity")]
    MediaAttachment,
}

impl Related<super::media_attachment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MediaAttachment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
