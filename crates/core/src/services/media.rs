//! Media processing service for image and video handling.
//!
//! Derivation is a pure function of the input bytes and the configured
//! limits: no clock, no randomness, so the same upload always yields the same
//! metadata, thumbnail and blurhash.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tootbox_common::{AppError, AppResult, MediaSettings};
use tootbox_db::entities::MediaKind;

use super::media_attachment::VariantMeta;
use super::probe;

/// Thumbnails are always JPEG.
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Thumbnail file extension.
pub const THUMBNAIL_EXTENSION: &str = "jpg";

/// Longest edge of the placeholder thumbnail for audio and video.
const PLACEHOLDER_EDGE: u32 = 256;

/// Placeholder fill colour.
const PLACEHOLDER_COLOR: Rgb<u8> = Rgb([0x28, 0x2C, 0x37]);

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// JPEG format
    Jpeg,
    /// PNG format
    Png,
    /// WebP format
    WebP,
    /// GIF format
    Gif,
}

impl ImageFormat {
    /// Get MIME type for this format.
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    /// Get file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Gif => "gif",
        }
    }

    /// Detect format from MIME type.
    #[must_use]
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::WebP),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    const fn codec(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::WebP => image::ImageFormat::WebP,
            Self::Gif => image::ImageFormat::Gif,
        }
    }
}

/// Detect image format from magic bytes.
pub fn detect_image_format(data: &[u8]) -> AppResult<ImageFormat> {
    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Ok(ImageFormat::Jpeg);
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Ok(ImageFormat::Png);
    }

    // GIF: GIF87a or GIF89a
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Ok(ImageFormat::Gif);
    }

    // WebP: RIFF....WEBP
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Ok(ImageFormat::WebP);
    }

    Err(AppError::Decode(
        "Unknown or unsupported image format".to_string(),
    ))
}

/// File extension for an upload's declared content type.
#[must_use]
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if let Some(format) = ImageFormat::from_mime_type(&essence) {
        return format.extension();
    }
    match essence.as_str() {
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "video/webm" | "audio/webm" => "webm",
        "video/ogg" | "audio/ogg" => "ogg",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/x-m4a" => "m4a",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        _ => "bin",
    }
}

/// Everything derived from one upload.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMedia {
    /// Metadata of the original.
    pub original: VariantMeta,
    /// Content type sniffed from the original bytes.
    pub original_content_type: &'static str,
    /// File extension matching `original_content_type`.
    pub original_extension: &'static str,
    /// Encoded thumbnail bytes (JPEG).
    pub thumbnail: Vec<u8>,
    /// Metadata of the thumbnail.
    pub small: VariantMeta,
    /// `BlurHash` of the thumbnail, for images only.
    pub blurhash: Option<String>,
}

/// Media processing service.
#[derive(Debug, Clone)]
pub struct MediaService {
    config: MediaSettings,
}

impl MediaService {
    /// Create a new media service.
    #[must_use]
    pub const fn new(config: MediaSettings) -> Self {
        Self { config }
    }

    /// Media settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &MediaSettings {
        &self.config
    }

    /// Derive metadata, thumbnail and blurhash from an upload.
    ///
    /// Fails with [`AppError::Decode`] when the bytes are not a supported
    /// file of the given kind; nothing is derived in that case.
    pub fn derive(&self, data: &[u8], kind: MediaKind) -> AppResult<DerivedMedia> {
        match kind {
            MediaKind::Image | MediaKind::Gif => self.derive_image(data, kind),
            MediaKind::Video | MediaKind::Audio => self.derive_av(data, kind),
            MediaKind::Unknown => Err(AppError::Decode(
                "Cannot derive media of unknown kind".to_string(),
            )),
        }
    }

    fn derive_image(&self, data: &[u8], kind: MediaKind) -> AppResult<DerivedMedia> {
        let format = detect_image_format(data)?;
        if (format == ImageFormat::Gif) != (kind == MediaKind::Gif) {
            return Err(AppError::Decode(format!(
                "{} data does not match declared kind {kind}",
                format.mime_type()
            )));
        }

        let img = image::load_from_memory_with_format(data, format.codec())
            .map_err(|e| AppError::Decode(format!("Failed to decode image: {e}")))?;
        let (width, height) = (img.width(), img.height());
        if width == 0 || height == 0 {
            return Err(AppError::Decode("Image has no pixels".to_string()));
        }

        let (thumb_width, thumb_height) =
            fit_within(width, height, self.config.thumbnail_max_dimension);
        let thumb = if (thumb_width, thumb_height) == (width, height) {
            img
        } else {
            img.thumbnail_exact(thumb_width, thumb_height)
        };

        let thumbnail = self.encode_jpeg(&thumb.to_rgb8())?;
        let blurhash = self.blurhash(&thumb)?;

        Ok(DerivedMedia {
            original: VariantMeta::new(width, height),
            original_content_type: format.mime_type(),
            original_extension: format.extension(),
            thumbnail,
            small: VariantMeta::new(thumb.width(), thumb.height()),
            blurhash: Some(blurhash),
        })
    }

    fn derive_av(&self, data: &[u8], kind: MediaKind) -> AppResult<DerivedMedia> {
        let probed = probe::probe(data)?;
        let video = kind == MediaKind::Video;
        if video && !probed.container.can_hold_video() {
            return Err(AppError::Decode(format!(
                "{} is not a video container",
                probed.container.mime_type(false)
            )));
        }

        let (width, height) = match probed.dimensions {
            Some(dimensions) if video => dimensions,
            _ => (0, 0),
        };

        let edge = PLACEHOLDER_EDGE.min(self.config.thumbnail_max_dimension).max(1);
        let (thumb_width, thumb_height) = if width > 0 && height > 0 {
            scale_to_edge(width, height, edge)
        } else {
            (edge, edge)
        };
        let placeholder = RgbImage::from_pixel(thumb_width, thumb_height, PLACEHOLDER_COLOR);
        let thumbnail = self.encode_jpeg(&placeholder)?;

        Ok(DerivedMedia {
            original: VariantMeta::new(width, height).with_duration(probed.duration),
            original_content_type: probed.container.mime_type(video),
            original_extension: probed.container.extension(video),
            thumbnail,
            small: VariantMeta::new(thumb_width, thumb_height),
            blurhash: None,
        })
    }

    /// Re-encode the first frame of an image as PNG.
    ///
    /// Used for the static variant of custom emoji.
    pub fn static_image(&self, data: &[u8]) -> AppResult<(Vec<u8>, VariantMeta)> {
        let format = detect_image_format(data)?;
        let img = image::load_from_memory_with_format(data, format.codec())
            .map_err(|e| AppError::Decode(format!("Failed to decode image: {e}")))?;

        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .map_err(|e| AppError::Internal(format!("Failed to encode PNG: {e}")))?;

        Ok((out, VariantMeta::new(img.width(), img.height())))
    }

    fn encode_jpeg(&self, img: &RgbImage) -> AppResult<Vec<u8>> {
        let quality = self.config.thumbnail_quality.clamp(1, 100);
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode_image(img)
            .map_err(|e| AppError::Internal(format!("Failed to encode thumbnail: {e}")))?;
        Ok(out)
    }

    fn blurhash(&self, img: &DynamicImage) -> AppResult<String> {
        let (cx, cy) = self.config.blurhash_components;
        let rgba = img.to_rgba8();
        blurhash::encode(
            cx.clamp(1, 9),
            cy.clamp(1, 9),
            rgba.width(),
            rgba.height(),
            rgba.as_raw(),
        )
        .map_err(|e| AppError::Internal(format!("Failed to compute blurhash: {e}")))
    }
}

/// Size of a `width` x `height` image scaled down so its longest edge is at
/// most `max`. Never scales up.
fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    scale_to_edge(width, height, max)
}

/// Scale so the longest edge is exactly `edge`, keeping the aspect ratio.
fn scale_to_edge(width: u32, height: u32, edge: u32) -> (u32, u32) {
    let edge = edge.max(1);
    if width >= height {
        let h = (u64::from(height) * u64::from(edge) + u64::from(width) / 2) / u64::from(width);
        (edge, (h as u32).max(1))
    } else {
        let w = (u64::from(width) * u64::from(edge) + u64::from(height) / 2) / u64::from(height);
        ((w as u32).max(1), edge)
    }
}
