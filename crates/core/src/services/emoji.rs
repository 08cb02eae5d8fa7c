//! Custom emoji service.

use chrono::Utc;
use sea_orm::{IntoActiveModel, Set};
use tootbox_common::{AppError, AppResult, IdGenerator, StorageService, emoji_key};
use tootbox_db::{entities::emoji, repositories::EmojiRepository};
use tracing::{info, warn};
use validator::Validate;

use crate::services::custom_emoji::CustomEmoji;
use crate::services::media::{self, MediaService};

/// Largest accepted emoji image (256KB).
pub const MAX_EMOJI_SIZE: usize = 256 * 1024;

/// Longest accepted shortcode.
pub const MAX_SHORTCODE_LENGTH: usize = 64;

/// Input for uploading a local emoji.
#[derive(Debug, Clone, Validate)]
pub struct CreateEmojiInput {
    pub shortcode: String,
    #[validate(length(min = 1, message = "Emoji image is empty"))]
    pub data: Vec<u8>,
    #[validate(length(max = 128))]
    pub category: Option<String>,
}

/// Input for recording an emoji seen on another server.
#[derive(Debug, Clone, Validate)]
pub struct RemoteEmojiInput {
    pub shortcode: String,
    #[validate(length(min = 1, max = 255))]
    pub domain: String,
    #[validate(url)]
    pub uri: String,
    #[validate(url)]
    pub image_remote_url: String,
    /// Defaults to `image_remote_url`.
    #[validate(url)]
    pub image_static_remote_url: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub content_type: String,
}

/// Service for custom emoji operations.
#[derive(Clone)]
pub struct EmojiService {
    emoji_repo: EmojiRepository,
    storage: StorageService,
    media: MediaService,
    local_host: String,
    id_gen: IdGenerator,
}

/// Lower-case a shortcode and check it is 1-64 characters of `a-z0-9_`.
fn normalize_shortcode(shortcode: &str) -> AppResult<String> {
    let shortcode = shortcode.trim().to_ascii_lowercase();
    let valid = !shortcode.is_empty()
        && shortcode.len() <= MAX_SHORTCODE_LENGTH
        && shortcode
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(AppError::Validation(format!(
            "Shortcode must be 1-{MAX_SHORTCODE_LENGTH} characters of a-z, 0-9 and _"
        )));
    }
    Ok(shortcode)
}

impl EmojiService {
    /// Create a new emoji service.
    #[must_use]
    pub fn new(
        emoji_repo: EmojiRepository,
        storage: StorageService,
        media: MediaService,
        local_host: &str,
    ) -> Self {
        Self {
            emoji_repo,
            storage,
            media,
            local_host: local_host.to_ascii_lowercase(),
            id_gen: IdGenerator::new(),
        }
    }

    /// Upload a local emoji.
    ///
    /// Stores the image as uploaded plus a static PNG of its first frame.
    pub async fn create_local(&self, input: CreateEmojiInput) -> AppResult<CustomEmoji> {
        input.validate()?;
        let shortcode = normalize_shortcode(&input.shortcode)?;

        if input.data.len() > MAX_EMOJI_SIZE {
            return Err(AppError::Validation(format!(
                "Emoji image is too large. Maximum size is {MAX_EMOJI_SIZE} bytes"
            )));
        }
        let format = media::detect_image_format(&input.data)?;

        if self
            .emoji_repo
            .find_by_shortcode_and_domain(&shortcode, "")
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "Emoji :{shortcode}: already exists"
            )));
        }

        let media = self.media.clone();
        let data = input.data;
        let (data, static_png) = tokio::task::spawn_blocking(move || {
            let result = media.static_image(&data);
            (data, result)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Emoji conversion task failed: {e}")))?;
        let (static_png, _) = static_png?;

        let id = self.id_gen.generate();
        let image_key = emoji_key(&id, false, format.extension());
        let static_key = emoji_key(&id, true, "png");

        let image = self
            .storage
            .put(&image_key, &data, format.mime_type())
            .await?;
        let image_static = match self.storage.put(&static_key, &static_png, "image/png").await {
            Ok(file) => file,
            Err(e) => {
                self.remove_blobs(&[image_key]).await;
                return Err(e);
            }
        };

        let now = Utc::now();
        let model = emoji::ActiveModel {
            id: Set(id.clone()),
            shortcode: Set(shortcode.clone()),
            domain: Set(String::new()),
            uri: Set(format!("https://{}/emojis/{id}", self.local_host)),
            image_path: Set(Some(image.key)),
            image_url: Set(Some(image.url)),
            image_remote_url: Set(None),
            image_static_path: Set(Some(image_static.key)),
            image_static_url: Set(Some(image_static.url)),
            image_static_remote_url: Set(None),
            image_content_type: Set(image.content_type),
            image_static_content_type: Set(image_static.content_type),
            image_file_size: Set(image.size as i64),
            image_static_file_size: Set(image_static.size as i64),
            image_updated_at: Set(now),
            disabled: Set(false),
            visible_in_picker: Set(true),
            category: Set(input.category),
            created_at: Set(now),
            updated_at: Set(None),
        };

        match self.emoji_repo.create(model).await {
            Ok(created) => {
                info!(emoji_id = %created.id, shortcode = %shortcode, "Custom emoji created");
                CustomEmoji::try_from(created)
            }
            Err(e) => {
                self.remove_blobs(&[image_key, static_key]).await;
                Err(e)
            }
        }
    }

    /// Record an emoji used by another server. Nothing is downloaded.
    pub async fn register_remote(&self, input: RemoteEmojiInput) -> AppResult<CustomEmoji> {
        input.validate()?;
        let shortcode = normalize_shortcode(&input.shortcode)?;
        let domain = input.domain.to_ascii_lowercase();
        if domain == self.local_host {
            return Err(AppError::Validation(
                "Remote emoji cannot use the local domain".to_string(),
            ));
        }

        if self
            .emoji_repo
            .find_by_shortcode_and_domain(&shortcode, &domain)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "Emoji :{shortcode}: from {domain} already exists"
            )));
        }

        let now = Utc::now();
        let static_url = input
            .image_static_remote_url
            .unwrap_or_else(|| input.image_remote_url.clone());
        let model = emoji::ActiveModel {
            id: Set(self.id_gen.generate()),
            shortcode: Set(shortcode),
            domain: Set(domain),
            uri: Set(input.uri),
            image_path: Set(None),
            image_url: Set(None),
            image_remote_url: Set(Some(input.image_remote_url)),
            image_static_path: Set(None),
            image_static_url: Set(None),
            image_static_remote_url: Set(Some(static_url)),
            image_content_type: Set(input.content_type.clone()),
            image_static_content_type: Set(input.content_type),
            image_file_size: Set(0),
            image_static_file_size: Set(0),
            image_updated_at: Set(now),
            disabled: Set(false),
            visible_in_picker: Set(false),
            category: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
        };

        CustomEmoji::try_from(self.emoji_repo.create(model).await?)
    }

    /// Get an emoji by shortcode. `domain` is `""` for local emoji.
    pub async fn get(&self, shortcode: &str, domain: &str) -> AppResult<Option<CustomEmoji>> {
        self.emoji_repo
            .find_by_shortcode_and_domain(
                &shortcode.to_ascii_lowercase(),
                &domain.to_ascii_lowercase(),
            )
            .await?
            .map(CustomEmoji::try_from)
            .transpose()
    }

    /// Enabled emoji from `domain` for the given shortcodes, e.g. the output
    /// of `derive_emojis`. Unknown and disabled shortcodes are left out.
    pub async fn find_usable(
        &self,
        shortcodes: &[String],
        domain: &str,
    ) -> AppResult<Vec<CustomEmoji>> {
        let shortcodes: Vec<String> = shortcodes
            .iter()
            .map(|s| s.to_ascii_lowercase())
            .collect();
        self.emoji_repo
            .find_usable(&shortcodes, &domain.to_ascii_lowercase())
            .await?
            .into_iter()
            .map(CustomEmoji::try_from)
            .collect()
    }

    /// Local emoji shown in the picker.
    pub async fn list_picker(&self) -> AppResult<Vec<CustomEmoji>> {
        self.emoji_repo
            .list_picker()
            .await?
            .into_iter()
            .map(CustomEmoji::try_from)
            .collect()
    }

    /// Categories used by local emoji.
    pub async fn list_categories(&self) -> AppResult<Vec<String>> {
        self.emoji_repo.find_categories().await
    }

    async fn get_by_id(&self, id: &str) -> AppResult<emoji::Model> {
        self.emoji_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Emoji: {id}")))
    }

    /// Disable or re-enable an emoji.
    pub async fn set_disabled(&self, id: &str, disabled: bool) -> AppResult<CustomEmoji> {
        let mut model = self.get_by_id(id).await?.into_active_model();
        model.disabled = Set(disabled);
        model.updated_at = Set(Some(Utc::now()));
        CustomEmoji::try_from(self.emoji_repo.update(model).await?)
    }

    /// Show or hide an emoji in the picker.
    pub async fn set_visible_in_picker(&self, id: &str, visible: bool) -> AppResult<CustomEmoji> {
        let mut model = self.get_by_id(id).await?.into_active_model();
        model.visible_in_picker = Set(visible);
        model.updated_at = Set(Some(Utc::now()));
        CustomEmoji::try_from(self.emoji_repo.update(model).await?)
    }

    /// Move an emoji into a category, or out of any.
    pub async fn set_category(
        &self,
        id: &str,
        category: Option<String>,
    ) -> AppResult<CustomEmoji> {
        let category = category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if category.as_ref().is_some_and(|c| c.chars().count() > 128) {
            return Err(AppError::Validation(
                "Category is longer than 128 characters".to_string(),
            ));
        }

        let mut model = self.get_by_id(id).await?.into_active_model();
        model.category = Set(category);
        model.updated_at = Set(Some(Utc::now()));
        CustomEmoji::try_from(self.emoji_repo.update(model).await?)
    }

    /// Delete an emoji and, for local emoji, its stored images.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let emoji = self.get_by_id(id).await?;
        if !self.emoji_repo.delete(id).await? {
            return Err(AppError::NotFound(format!("Emoji: {id}")));
        }

        let keys: Vec<String> = [emoji.image_path, emoji.image_static_path]
            .into_iter()
            .flatten()
            .collect();
        self.remove_blobs(&keys).await;

        info!(emoji_id = %id, shortcode = %emoji.shortcode, "Custom emoji deleted");
        Ok(())
    }

    async fn remove_blobs(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.storage.delete(key).await {
                warn!(key = %key, error = %e, "Failed to remove emoji image");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::media::fixtures;
    use crate::services::media_attachment::AssetSource;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;
    use tootbox_common::{MediaSettings, MemoryStorage, StorageBackend};

    fn create_test_emoji(id: &str, shortcode: &str, domain: &str) -> emoji::Model {
        emoji::Model {
            id: id.to_string(),
            shortcode: shortcode.to_string(),
            domain: domain.to_string(),
            uri: format!("https://tootbox.test/emojis/{id}"),
            image_path: Some(format!("emoji/original/{id}.png")),
            image_url: Some(format!("https://files.tootbox.test/emoji/original/{id}.png")),
            image_remote_url: None,
            image_static_path: Some(format!("emoji/static/{id}.png")),
            image_static_url: Some(format!("https://files.tootbox.test/emoji/static/{id}.png")),
            image_static_remote_url: None,
            image_content_type: "image/png".to_string(),
            image_static_content_type: "image/png".to_string(),
            image_file_size: 128,
            image_static_file_size: 128,
            image_updated_at: Utc::now(),
            disabled: false,
            visible_in_picker: true,
            category: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn service(db: MockDatabase) -> (EmojiService, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new("https://files.tootbox.test"));
        let service = EmojiService::new(
            EmojiRepository::new(Arc::new(db.into_connection())),
            storage.clone(),
            MediaService::new(MediaSettings::default()),
            "tootbox.test",
        );
        (service, storage)
    }

    fn remote_input(shortcode: &str) -> RemoteEmojiInput {
        RemoteEmojiInput {
            shortcode: shortcode.to_string(),
            domain: "Remote.Example".to_string(),
            uri: format!("https://remote.example/emojis/{shortcode}"),
            image_remote_url: format!("https://remote.example/files/{shortcode}.png"),
            image_static_remote_url: None,
            content_type: "image/png".to_string(),
        }
    }

    #[test]
    fn test_normalize_shortcode() {
        assert_eq!(normalize_shortcode("Blob_Hug").unwrap(), "blob_hug");
        assert!(normalize_shortcode("").is_err());
        assert!(normalize_shortcode("blob-hug").is_err());
        assert!(normalize_shortcode(":blob:").is_err());
        assert!(normalize_shortcode(&"a".repeat(65)).is_err());
    }

    #[tokio::test]
    async fn test_create_local_stores_both_images() {
        let created = create_test_emoji("emoji1", "blob", "");
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<emoji::Model>::new()])
            .append_query_results([[created]]);
        let (service, storage) = service(db);

        let gif = fixtures::image(16, 16, image::ImageFormat::Gif);
        let result = service
            .create_local(CreateEmojiInput {
                shortcode: "Blob".to_string(),
                data: gif,
                category: None,
            })
            .await
            .unwrap();
        assert_eq!(result.shortcode, "blob");
        assert!(matches!(result.image.source, AssetSource::Local { .. }));
        assert_eq!(result.storage_keys().len(), 2);

        let keys = storage.keys().await;
        assert_eq!(keys.len(), 2);
        let original = keys.iter().find(|k| k.starts_with("emoji/original/")).unwrap();
        let still = keys.iter().find(|k| k.starts_with("emoji/static/")).unwrap();
        assert!(original.ends_with(".gif"));
        assert_eq!(storage.content_type(still).await.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn test_create_local_duplicate_is_conflict() {
        let existing = create_test_emoji("emoji1", "blob", "");
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[existing]]);
        let (service, storage) = service(db);

        let result = service
            .create_local(CreateEmojiInput {
                shortcode: "blob".to_string(),
                data: fixtures::png(8, 8),
                category: None,
            })
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert!(storage.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_local_rejects_bad_input() {
        let (service, _) = service(MockDatabase::new(DatabaseBackend::Postgres));

        let bad_shortcode = service
            .create_local(CreateEmojiInput {
                shortcode: "blob hug".to_string(),
                data: fixtures::png(8, 8),
                category: None,
            })
            .await;
        assert!(matches!(bad_shortcode, Err(AppError::Validation(_))));

        let not_an_image = service
            .create_local(CreateEmojiInput {
                shortcode: "blob".to_string(),
                data: b"hello".to_vec(),
                category: None,
            })
            .await;
        assert!(matches!(not_an_image, Err(AppError::Decode(_))));
    }

    #[tokio::test]
    async fn test_register_remote() {
        let mut created = create_test_emoji("emoji2", "blob", "remote.example");
        created.image_path = None;
        created.image_url = None;
        created.image_remote_url = Some("https://remote.example/files/blob.png".to_string());
        created.image_static_path = None;
        created.image_static_url = None;
        created.image_static_remote_url = Some("https://remote.example/files/blob.png".to_string());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<emoji::Model>::new()])
            .append_query_results([[created]]);
        let (service, storage) = service(db);

        let result = service.register_remote(remote_input("blob")).await.unwrap();
        assert_eq!(result.domain, "remote.example");
        assert!(!result.is_local());
        assert_eq!(
            result.image.source,
            AssetSource::Remote {
                remote_url: "https://remote.example/files/blob.png".to_string(),
            }
        );
        assert!(result.storage_keys().is_empty());
        assert!(storage.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_register_remote_duplicate_is_conflict() {
        let existing = create_test_emoji("emoji2", "blob", "remote.example");
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([[existing]]);
        let (service, _) = service(db);

        assert!(matches!(
            service.register_remote(remote_input("blob")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_register_remote_rejects_local_domain() {
        let (service, _) = service(MockDatabase::new(DatabaseBackend::Postgres));
        let input = RemoteEmojiInput {
            domain: "tootbox.test".to_string(),
            ..remote_input("blob")
        };
        assert!(matches!(
            service.register_remote(input).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_find_usable_without_shortcodes() {
        let (service, _) = service(MockDatabase::new(DatabaseBackend::Postgres));
        assert!(service.find_usable(&[], "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_disabled() {
        let emoji = create_test_emoji("emoji1", "blob", "");
        let mut disabled = emoji.clone();
        disabled.disabled = true;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[emoji]])
            .append_query_results([[disabled]]);
        let (service, _) = service(db);

        let updated = service.set_disabled("emoji1", true).await.unwrap();
        assert!(updated.disabled);
    }

    #[tokio::test]
    async fn test_set_category_missing_emoji() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<emoji::Model>::new()]);
        let (service, _) = service(db);

        assert!(matches!(
            service
                .set_category("missing", Some("blobs".to_string()))
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_images() {
        let emoji = create_test_emoji("emoji1", "blob", "");
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[emoji]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }]);
        let (service, storage) = service(db);
        storage
            .put("emoji/original/emoji1.png", b"png", "image/png")
            .await
            .unwrap();
        storage
            .put("emoji/static/emoji1.png", b"png", "image/png")
            .await
            .unwrap();

        service.delete("emoji1").await.unwrap();
        assert!(storage.keys().await.is_empty());
    }
}
