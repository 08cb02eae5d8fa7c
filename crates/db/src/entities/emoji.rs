//! Custom emoji entity.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Custom emoji usable in status bodies as `:shortcode:`.
///
/// `(shortcode, domain)` is unique; `domain` is the empty string for emoji
/// that originate on this instance.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "emoji")]
pub struct Model {
    /// Emoji ID.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Shortcode, the part between the colons (e.g. "blob_hug").
    pub shortcode: String,

    /// Origin domain, empty for local emoji.
    pub domain: String,

    /// `ActivityStreams` id of this emoji.
    #[sea_orm(unique)]
    pub uri: String,

    /// Storage path of the original image (local emoji).
    pub image_path: Option<String>,

    /// Local URL of the original image.
    pub image_url: Option<String>,

    /// Remote URL of the original image (remote emoji).
    pub image_remote_url: Option<String>,

    /// Storage path of the static, non-animated image (local emoji).
    pub image_static_path: Option<String>,

    /// Local URL of the static image.
    pub image_static_url: Option<String>,

    /// Remote URL of the static image (remote emoji).
    pub image_static_remote_url: Option<String>,

    /// MIME type of the original image.
    pub image_content_type: String,

    /// MIME type of the static image.
    pub image_static_content_type: String,

    /// Size of the original image in bytes.
    pub image_file_size: i64,

    /// Size of the static image in bytes.
    pub image_static_file_size: i64,

    /// When the image was last replaced.
    pub image_updated_at: DateTime<Utc>,

    /// Disabled by moderation; treated as absent everywhere.
    pub disabled: bool,

    /// Whether the emoji is listed in the picker.
    pub visible_in_picker: bool,

    /// Category for organizing emojis (nullable).
    pub category: Option<String>,

    /// Created at timestamp.
    pub created_at: DateTime<Utc>,

    /// Updated at timestamp.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// Whether this emoji originates on this instance.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.domain.is_empty()
    }
}

/// Emoji relations.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
