//! Blob storage abstraction for uploaded and derived media.
//!
//! Keys are slash-separated paths namespaced per account and per attachment
//! (see [`attachment_key`]); the backend only stores, returns and removes
//! bytes and knows how to turn a key into a public URL.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{AppError, AppResult};

/// Stored blob metadata.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Storage key (path or object key).
    pub key: String,
    /// Public URL to access the file.
    pub url: String,
    /// File size in bytes.
    pub size: u64,
    /// MIME content type.
    pub content_type: String,
    /// MD5 hash of the file.
    pub md5: String,
}

/// Storage backend trait.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store `data` under `key`, replacing any previous blob.
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<UploadedFile>;

    /// Read the blob stored under `key`.
    async fn get(&self, key: &str) -> AppResult<Vec<u8>>;

    /// Delete a blob. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Get the public URL for a key.
    fn public_url(&self, key: &str) -> String;

    /// Check if a blob exists.
    async fn exists(&self, key: &str) -> AppResult<bool>;
}

/// Shared handle to a storage backend.
pub type StorageService = Arc<dyn StorageBackend>;

/// Local filesystem storage backend.
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new local storage backend.
    #[must_use]
    pub const fn new(base_path: PathBuf, base_url: String) -> Self {
        Self {
            base_path,
            base_url,
        }
    }

    /// Resolve a key below the base path, refusing keys that escape it.
    fn resolve(&self, key: &str) -> AppResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(AppError::BadRequest(format!("Invalid storage key: {key}")));
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalStorage {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<UploadedFile> {
        let path = self.resolve(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::StorageWrite(format!("Failed to create directory: {e}")))?;
        }

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::StorageWrite(format!("Failed to write {key}: {e}")))?;

        tracing::debug!(key = %key, size = data.len(), "Stored blob");

        Ok(UploadedFile {
            key: key.to_string(),
            url: self.public_url(key),
            size: data.len() as u64,
            content_type: content_type.to_string(),
            md5: format!("{:x}", md5::compute(data)),
        })
    }

    async fn get(&self, key: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("Blob: {key}")))
            }
            Err(e) => Err(AppError::Storage(format!("Failed to read {key}: {e}"))),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("Failed to delete {key}: {e}"))),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let path = self.resolve(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to stat {key}: {e}")))
    }
}

/// In-memory storage backend, used in tests and single-process setups.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    base_url: String,
    blobs: Arc<RwLock<HashMap<String, (String, Vec<u8>)>>>,
}

impl MemoryStorage {
    /// Create an empty in-memory backend serving under `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            blobs: Arc::default(),
        }
    }

    /// Keys currently stored, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Content type recorded for a key.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.blobs.read().await.get(key).map(|(ct, _)| ct.clone())
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryStorage {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<UploadedFile> {
        self.blobs
            .write()
            .await
            .insert(key.to_string(), (content_type.to_string(), data.to_vec()));

        Ok(UploadedFile {
            key: key.to_string(),
            url: self.public_url(key),
            size: data.len() as u64,
            content_type: content_type.to_string(),
            md5: format!("{:x}", md5::compute(data)),
        })
    }

    async fn get(&self, key: &str) -> AppResult<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(key)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| AppError::NotFound(format!("Blob: {key}")))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.blobs.write().await.remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.blobs.read().await.contains_key(key))
    }
}

/// Which stored variant of an attachment a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentVariant {
    /// The raw upload, kept until processing finishes.
    Upload,
    /// The full-size original.
    Original,
    /// The derived thumbnail.
    Small,
}

impl AttachmentVariant {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Original => "original",
            Self::Small => "small",
        }
    }
}

/// Build the storage key of one variant of an attachment.
///
/// Keys look like `{account_id}/attachment/{variant}/{attachment_id}.{ext}`,
/// so writes for different attachments never collide.
#[must_use]
pub fn attachment_key(
    account_id: &str,
    attachment_id: &str,
    variant: AttachmentVariant,
    extension: &str,
) -> String {
    let extension = sanitize_extension(extension);
    format!(
        "{account_id}/attachment/{}/{attachment_id}.{extension}",
        variant.as_str()
    )
}

/// Build the storage key of a local custom emoji image.
#[must_use]
pub fn emoji_key(emoji_id: &str, is_static: bool, extension: &str) -> String {
    let variant = if is_static { "static" } else { "original" };
    format!("emoji/{variant}/{emoji_id}.{}", sanitize_extension(extension))
}

fn sanitize_extension(extension: &str) -> &str {
    if !extension.is_empty()
        && extension.len() <= 10
        && extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        extension
    } else {
        "bin"
    }
}
