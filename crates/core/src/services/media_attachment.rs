//! Media attachment domain types.
//!
//! The sea-orm row flattens every asset into nullable columns; here the same
//! data is shaped the way the pipeline reasons about it: an optional stored
//! original and thumbnail, each either local or remote, plus the derived
//! metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tootbox_db::entities::{MediaKind, ProcessingState, media_attachment};
use validator::Validate;

/// Where the bytes of a stored asset live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AssetSource {
    /// Written to our own storage backend.
    Local {
        /// Storage key.
        path: String,
        /// Public URL.
        url: String,
    },
    /// Still hosted by the server the media was federated from.
    Remote {
        /// Origin URL.
        remote_url: String,
    },
}

/// A stored original or thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAsset {
    pub source: AssetSource,
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
    pub updated_at: DateTime<Utc>,
}

impl StoredAsset {
    /// URL clients should load the asset from.
    #[must_use]
    pub fn url(&self) -> &str {
        match &self.source {
            AssetSource::Local { url, .. } => url,
            AssetSource::Remote { remote_url } => remote_url,
        }
    }

    /// Storage key, for locally stored assets.
    #[must_use]
    pub fn storage_key(&self) -> Option<&str> {
        match &self.source {
            AssetSource::Local { path, .. } => Some(path),
            AssetSource::Remote { .. } => None,
        }
    }
}

/// Dimensions and size of one variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariantMeta {
    pub width: u32,
    pub height: u32,
    /// Pixel count (`width * height`).
    pub size: u64,
    /// `width / height`.
    pub aspect: f64,
    /// Running time in seconds, for audio and video.
    pub duration: Option<f64>,
}

impl VariantMeta {
    /// Metadata for a `width` x `height` variant.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let aspect = if height == 0 {
            0.0
        } else {
            f64::from(width) / f64::from(height)
        };
        Self {
            width,
            height,
            size: u64::from(width) * u64::from(height),
            aspect,
            duration: None,
        }
    }

    /// Same metadata with a running time attached.
    #[must_use]
    pub const fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }
}

/// Focal point used when cropping previews. Both axes run from -1 to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct Focus {
    #[validate(range(min = -1.0, max = 1.0))]
    pub x: f32,
    #[validate(range(min = -1.0, max = 1.0))]
    pub y: f32,
}

/// Derived metadata of an attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub original: Option<VariantMeta>,
    pub small: Option<VariantMeta>,
    pub focus: Option<Focus>,
}

/// A media attachment as the pipeline sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub id: String,
    /// Owning account.
    pub account_id: String,
    /// Status this attachment is used by.
    pub status_id: Option<String>,
    pub kind: MediaKind,
    pub processing: ProcessingState,
    /// Alt text.
    pub description: Option<String>,
    /// Origin URL of federated-in media.
    pub remote_url: Option<String>,
    /// Thumbnail URL advertised by the origin server.
    pub thumbnail_remote_url: Option<String>,
    /// Storage key of the raw upload, until processing finishes.
    pub staging_key: Option<String>,
    /// Content type declared at ingest.
    pub upload_content_type: String,
    pub original: Option<StoredAsset>,
    pub thumbnail: Option<StoredAsset>,
    pub meta: FileMeta,
    pub blurhash: Option<String>,
    /// Why processing failed.
    pub error_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaAttachment {
    /// Whether the attachment may be shown to clients.
    #[must_use]
    pub fn is_servable(&self) -> bool {
        self.processing != ProcessingState::Error
    }

    /// Thumbnail URL, once a thumbnail has been derived.
    #[must_use]
    pub fn thumbnail_url(&self) -> Option<&str> {
        if !self.is_servable() {
            return None;
        }
        self.thumbnail.as_ref().map(StoredAsset::url)
    }

    /// Original URL, once processing has finished.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        if !self.is_servable() {
            return None;
        }
        self.original.as_ref().map(StoredAsset::url)
    }

    /// Whether the media was federated in rather than uploaded here.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        self.remote_url.is_some()
    }

    /// Storage keys of every blob this attachment owns.
    #[must_use]
    pub fn storage_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Some(key) = &self.staging_key {
            keys.push(key.clone());
        }
        for asset in [&self.original, &self.thumbnail].into_iter().flatten() {
            if let Some(key) = asset.storage_key() {
                keys.push(key.to_string());
            }
        }
        keys
    }
}

pub(crate) fn asset_from_columns(
    path: Option<String>,
    url: Option<String>,
    remote_url: Option<String>,
    content_type: Option<String>,
    size: Option<i64>,
    updated_at: Option<DateTime<Utc>>,
) -> Option<StoredAsset> {
    let (content_type, size, updated_at) = (content_type?, size?, updated_at?);
    let source = match (path, remote_url) {
        (Some(path), _) => AssetSource::Local {
            path,
            url: url.unwrap_or_default(),
        },
        (None, Some(remote_url)) => AssetSource::Remote { remote_url },
        (None, None) => return None,
    };
    Some(StoredAsset {
        source,
        content_type,
        size: size.max(0) as u64,
        updated_at,
    })
}

fn variant_from_columns(
    width: Option<i32>,
    height: Option<i32>,
    size: Option<i64>,
    aspect: Option<f64>,
    duration: Option<f64>,
) -> Option<VariantMeta> {
    Some(VariantMeta {
        width: width?.max(0) as u32,
        height: height?.max(0) as u32,
        size: size?.max(0) as u64,
        aspect: aspect?,
        duration,
    })
}

impl From<media_attachment::Model> for MediaAttachment {
    fn from(m: media_attachment::Model) -> Self {
        let original = asset_from_columns(
            m.file_path,
            m.file_url,
            m.remote_url.clone(),
            m.file_content_type,
            m.file_size,
            m.file_updated_at.map(|t| t.with_timezone(&Utc)),
        );
        let thumbnail = asset_from_columns(
            m.thumbnail_path,
            m.thumbnail_url,
            None,
            m.thumbnail_content_type,
            m.thumbnail_size,
            m.thumbnail_updated_at.map(|t| t.with_timezone(&Utc)),
        );
        let focus = match (m.focus_x, m.focus_y) {
            (Some(x), Some(y)) => Some(Focus { x, y }),
            _ => None,
        };

        Self {
            id: m.id,
            account_id: m.account_id,
            status_id: m.status_id,
            kind: m.kind,
            processing: m.processing,
            description: m.description,
            remote_url: m.remote_url,
            thumbnail_remote_url: m.thumbnail_remote_url,
            staging_key: m.staging_key,
            upload_content_type: m.upload_content_type,
            original,
            thumbnail,
            meta: FileMeta {
                original: variant_from_columns(
                    m.original_width,
                    m.original_height,
                    m.original_size,
                    m.original_aspect,
                    m.original_duration,
                ),
                small: variant_from_columns(
                    m.small_width,
                    m.small_height,
                    m.small_size,
                    m.small_aspect,
                    None,
                ),
                focus,
            },
            blurhash: m.blurhash,
            error_reason: m.error_reason,
            created_at: m.created_at.with_timezone(&Utc),
            updated_at: m.updated_at.with_timezone(&Utc),
        }
    }
}

struct AssetColumns {
    path: Option<String>,
    url: Option<String>,
    content_type: Option<String>,
    size: Option<i64>,
    updated_at: Option<DateTime<Utc>>,
}

fn asset_columns(asset: Option<&StoredAsset>) -> AssetColumns {
    let Some(asset) = asset else {
        return AssetColumns {
            path: None,
            url: None,
            content_type: None,
            size: None,
            updated_at: None,
        };
    };
    let (path, url) = match &asset.source {
        AssetSource::Local { path, url } => (Some(path.clone()), Some(url.clone())),
        AssetSource::Remote { .. } => (None, None),
    };
    AssetColumns {
        path,
        url,
        content_type: Some(asset.content_type.clone()),
        size: Some(asset.size as i64),
        updated_at: Some(asset.updated_at),
    }
}

impl From<&MediaAttachment> for media_attachment::Model {
    fn from(a: &MediaAttachment) -> Self {
        let file = asset_columns(a.original.as_ref());
        let thumb = asset_columns(a.thumbnail.as_ref());
        let original = a.meta.original.as_ref();
        let small = a.meta.small.as_ref();

        Self {
            id: a.id.clone(),
            account_id: a.account_id.clone(),
            status_id: a.status_id.clone(),
            kind: a.kind,
            processing: a.processing,
            description: a.description.clone(),
            remote_url: a.remote_url.clone(),
            thumbnail_remote_url: a.thumbnail_remote_url.clone(),
            staging_key: a.staging_key.clone(),
            upload_content_type: a.upload_content_type.clone(),
            file_path: file.path,
            file_url: file.url,
            file_content_type: file.content_type,
            file_size: file.size,
            file_updated_at: file.updated_at.map(Into::into),
            thumbnail_path: thumb.path,
            thumbnail_url: thumb.url,
            thumbnail_content_type: thumb.content_type,
            thumbnail_size: thumb.size,
            thumbnail_updated_at: thumb.updated_at.map(Into::into),
            original_width: original.map(|v| v.width as i32),
            original_height: original.map(|v| v.height as i32),
            original_size: original.map(|v| v.size as i64),
            original_aspect: original.map(|v| v.aspect),
            original_duration: original.and_then(|v| v.duration),
            small_width: small.map(|v| v.width as i32),
            small_height: small.map(|v| v.height as i32),
            small_size: small.map(|v| v.size as i64),
            small_aspect: small.map(|v| v.aspect),
            focus_x: a.meta.focus.map(|f| f.x),
            focus_y: a.meta.focus.map(|f| f.y),
            blurhash: a.blurhash.clone(),
            error_reason: a.error_reason.clone(),
            created_at: a.created_at.into(),
            updated_at: a.updated_at.into(),
        }
    }
}
