//! Custom emoji domain type.
//!
//! Like attachments, the emoji row keeps its two images as parallel nullable
//! columns. [`CustomEmoji`] folds each into a [`StoredAsset`], so an image is
//! either local or remote and never both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tootbox_common::{AppError, AppResult};
use tootbox_db::entities::emoji;

use crate::services::media_attachment::{StoredAsset, asset_from_columns};

/// A custom emoji, local or federated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomEmoji {
    pub id: String,
    pub shortcode: String,
    /// Empty for local emoji.
    pub domain: String,
    pub uri: String,
    /// Image as uploaded, possibly animated.
    pub image: StoredAsset,
    /// Still PNG rendition.
    pub static_image: StoredAsset,
    pub disabled: bool,
    pub visible_in_picker: bool,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CustomEmoji {
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.domain.is_empty()
    }

    #[must_use]
    pub fn url(&self) -> &str {
        self.image.url()
    }

    #[must_use]
    pub fn static_url(&self) -> &str {
        self.static_image.url()
    }

    /// Storage keys of locally stored images.
    #[must_use]
    pub fn storage_keys(&self) -> Vec<String> {
        [&self.image, &self.static_image]
            .into_iter()
            .filter_map(StoredAsset::storage_key)
            .map(str::to_string)
            .collect()
    }
}

impl TryFrom<emoji::Model> for CustomEmoji {
    type Error = AppError;

    fn try_from(m: emoji::Model) -> AppResult<Self> {
        let missing = || AppError::Internal(format!("Emoji {} has no stored image", m.id));
        let image = asset_from_columns(
            m.image_path.clone(),
            m.image_url.clone(),
            m.image_remote_url.clone(),
            Some(m.image_content_type.clone()),
            Some(m.image_file_size),
            Some(m.image_updated_at),
        )
        .ok_or_else(missing)?;
        let static_image = asset_from_columns(
            m.image_static_path.clone(),
            m.image_static_url.clone(),
            m.image_static_remote_url.clone(),
            Some(m.image_static_content_type.clone()),
            Some(m.image_static_file_size),
            Some(m.image_updated_at),
        )
        .ok_or_else(missing)?;

        Ok(Self {
            id: m.id,
            shortcode: m.shortcode,
            domain: m.domain,
            uri: m.uri,
            image,
            static_image,
            disabled: m.disabled,
            visible_in_picker: m.visible_in_picker,
            category: m.category,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}
