//! Media attachment entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What kind of media an attachment holds. Fixed at ingest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still images (jpeg, png, webp).
    #[sea_orm(string_value = "image")]
    Image,
    /// Native gifs.
    #[sea_orm(string_value = "gif")]
    Gif,
    /// Audio-only files.
    #[sea_orm(string_value = "audio")]
    Audio,
    /// Files with a visual track.
    #[sea_orm(string_value = "video")]
    Video,
    /// Anything we cannot classify.
    #[sea_orm(string_value = "unknown")]
    Unknown,
}

impl MediaKind {
    /// Classify a MIME content type.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "image/jpeg" | "image/png" | "image/webp" => Self::Image,
            "image/gif" => Self::Gif,
            ct if ct.starts_with("video/") => Self::Video,
            ct if ct.starts_with("audio/") => Self::Audio,
            _ => Self::Unknown,
        }
    }

    /// Lower-case name, as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Gif => "gif",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far along processing an attachment is.
///
/// `Received → Processing → Processed | Error`; `Processed` and `Error` are
/// terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    /// Upload accepted, nothing derived yet.
    #[sea_orm(string_value = "received")]
    Received,
    /// A worker has claimed the attachment and is deriving variants.
    #[sea_orm(string_value = "processing")]
    Processing,
    /// Fully processed and servable.
    #[sea_orm(string_value = "processed")]
    Processed,
    /// Processing failed; the attachment can only be deleted.
    #[sea_orm(string_value = "error")]
    Error,
}

impl ProcessingState {
    /// Whether no further transition can leave this state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Error)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Processing)
                | (Self::Processing, Self::Processed | Self::Error)
        )
    }

    /// Lower-case name, as stored.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media attachment row.
///
/// Asset columns are nullable: original and thumbnail columns are filled in
/// as processing progresses, and exactly one of `file_path`/`remote_url`
/// describes where the original lives.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "media_attachment")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Owning account (lookup key)
    #[sea_orm(indexed)]
    pub account_id: String,

    /// Status this attachment is used by
    #[sea_orm(nullable)]
    pub status_id: Option<String>,

    pub kind: MediaKind,

    pub processing: ProcessingState,

    /// Alt text
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Where the original lives on a remote server (federated-in media)
    #[sea_orm(nullable)]
    pub remote_url: Option<String>,

    /// Remote thumbnail advertised by the origin server
    #[sea_orm(nullable)]
    pub thumbnail_remote_url: Option<String>,

    /// Storage key of the raw upload while unprocessed
    #[sea_orm(nullable)]
    pub staging_key: Option<String>,

    /// Declared content type of the upload
    pub upload_content_type: String,

    #[sea_orm(nullable)]
    pub file_path: Option<String>,
    #[sea_orm(nullable)]
    pub file_url: Option<String>,
    #[sea_orm(nullable)]
    pub file_content_type: Option<String>,
    #[sea_orm(nullable)]
    pub file_size: Option<i64>,
    #[sea_orm(nullable)]
    pub file_updated_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub thumbnail_path: Option<String>,
    #[sea_orm(nullable)]
    pub thumbnail_url: Option<String>,
    #[sea_orm(nullable)]
    pub thumbnail_content_type: Option<String>,
    #[sea_orm(nullable)]
    pub thumbnail_size: Option<i64>,
    #[sea_orm(nullable)]
    pub thumbnail_updated_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(nullable)]
    pub original_width: Option<i32>,
    #[sea_orm(nullable)]
    pub original_height: Option<i32>,
    #[sea_orm(nullable)]
    pub original_size: Option<i64>,
    #[sea_orm(nullable)]
    pub original_aspect: Option<f64>,
    /// Duration in seconds (audio/video)
    #[sea_orm(nullable)]
    pub original_duration: Option<f64>,

    #[sea_orm(nullable)]
    pub small_width: Option<i32>,
    #[sea_orm(nullable)]
    pub small_height: Option<i32>,
    #[sea_orm(nullable)]
    pub small_size: Option<i64>,
    #[sea_orm(nullable)]
    pub small_aspect: Option<f64>,

    /// Focal point, each axis in [-1, 1]
    #[sea_orm(nullable)]
    pub focus_x: Option<f32>,
    #[sea_orm(nullable)]
    pub focus_y: Option<f32>,

    /// `BlurHash` of the thumbnail
    #[sea_orm(nullable)]
    pub blurhash: Option<String>,

    /// Why processing failed
    #[sea_orm(column_type = "Text", nullable)]
    pub error_reason: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::AccountId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
