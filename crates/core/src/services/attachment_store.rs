//! Record store for media attachments.
//!
//! The lifecycle service only talks to [`AttachmentStore`]. Writes are split
//! into two disjoint column sets so the processing worker and a user editing
//! alt text never overwrite each other:
//!
//! - [`AttachmentStore::compare_and_swap`] writes the processing-owned fields
//!   (state, assets, derived metadata, blurhash, failure reason, staging key),
//!   gated on the stored state.
//! - [`AttachmentStore::update_details`] writes the user-owned fields
//!   (description, focus, status link).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};
use tokio::sync::Mutex;
use tootbox_common::AppResult;
use tootbox_db::entities::{ProcessingState, media_attachment};
use tootbox_db::repositories::MediaAttachmentRepository;

use super::media_attachment::MediaAttachment;

/// Persistence seam for attachment records.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Load one attachment.
    async fn load(&self, id: &str) -> AppResult<Option<MediaAttachment>>;

    /// Insert a new attachment.
    async fn insert(&self, attachment: &MediaAttachment) -> AppResult<()>;

    /// Write the processing-owned fields of `attachment` if the stored state
    /// is still `expected`. Returns whether the write happened.
    async fn compare_and_swap(
        &self,
        expected: ProcessingState,
        attachment: &MediaAttachment,
    ) -> AppResult<bool>;

    /// Write the user-owned fields of `attachment`. Returns `false` if the
    /// record no longer exists.
    async fn update_details(&self, attachment: &MediaAttachment) -> AppResult<bool>;

    /// Remove a record. Returns whether it existed.
    async fn delete(&self, id: &str) -> AppResult<bool>;

    /// An account's attachments, newest first.
    async fn find_by_account(&self, account_id: &str, limit: u64)
    -> AppResult<Vec<MediaAttachment>>;

    /// Attachments in `state` created before `older_than`, oldest first.
    async fn find_by_state(
        &self,
        state: ProcessingState,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<MediaAttachment>>;

    /// Attachments in `state` whose last update is before `updated_before`,
    /// least recently updated first.
    async fn find_stalled(
        &self,
        state: ProcessingState,
        updated_before: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<MediaAttachment>>;
}

/// Shared handle to an attachment store.
pub type AttachmentStoreService = Arc<dyn AttachmentStore>;

fn copy_processing_fields(target: &mut MediaAttachment, source: &MediaAttachment) {
    target.processing = source.processing;
    target.staging_key.clone_from(&source.staging_key);
    target.original.clone_from(&source.original);
    target.thumbnail.clone_from(&source.thumbnail);
    target.meta.original = source.meta.original;
    target.meta.small = source.meta.small;
    target.blurhash.clone_from(&source.blurhash);
    target.error_reason.clone_from(&source.error_reason);
    target.updated_at = source.updated_at;
}

fn copy_details(target: &mut MediaAttachment, source: &MediaAttachment) {
    target.description.clone_from(&source.description);
    target.meta.focus = source.meta.focus;
    target.status_id.clone_from(&source.status_id);
    target.updated_at = source.updated_at;
}

/// In-memory store. Every operation holds one mutex, so check-and-replace is
/// atomic.
#[derive(Default, Clone)]
pub struct MemoryAttachmentStore {
    records: Arc<Mutex<HashMap<String, MediaAttachment>>>,
}

impl MemoryAttachmentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttachmentStore for MemoryAttachmentStore {
    async fn load(&self, id: &str) -> AppResult<Option<MediaAttachment>> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn insert(&self, attachment: &MediaAttachment) -> AppResult<()> {
        let mut records = self.records.lock().await;
        if records.contains_key(&attachment.id) {
            return Err(tootbox_common::AppError::Conflict(format!(
                "Media attachment {} already exists",
                attachment.id
            )));
        }
        records.insert(attachment.id.clone(), attachment.clone());
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected: ProcessingState,
        attachment: &MediaAttachment,
    ) -> AppResult<bool> {
        let mut records = self.records.lock().await;
        match records.get_mut(&attachment.id) {
            Some(stored) if stored.processing == expected => {
                copy_processing_fields(stored, attachment);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_details(&self, attachment: &MediaAttachment) -> AppResult<bool> {
        let mut records = self.records.lock().await;
        match records.get_mut(&attachment.id) {
            Some(stored) => {
                copy_details(stored, attachment);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.records.lock().await.remove(id).is_some())
    }

    async fn find_by_account(
        &self,
        account_id: &str,
        limit: u64,
    ) -> AppResult<Vec<MediaAttachment>> {
        let records = self.records.lock().await;
        let mut found: Vec<_> = records
            .values()
            .filter(|a| a.account_id == account_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        found.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(found)
    }

    async fn find_by_state(
        &self,
        state: ProcessingState,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<MediaAttachment>> {
        let records = self.records.lock().await;
        let mut found: Vec<_> = records
            .values()
            .filter(|a| a.processing == state && a.created_at < older_than)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        found.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(found)
    }

    async fn find_stalled(
        &self,
        state: ProcessingState,
        updated_before: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<MediaAttachment>> {
        let records = self.records.lock().await;
        let mut found: Vec<_> = records
            .values()
            .filter(|a| a.processing == state && a.updated_at < updated_before)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
        found.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(found)
    }
}

fn processing_changes(attachment: &MediaAttachment) -> media_attachment::ActiveModel {
    let m = media_attachment::Model::from(attachment);
    media_attachment::ActiveModel {
        processing: Set(m.processing),
        staging_key: Set(m.staging_key),
        file_path: Set(m.file_path),
        file_url: Set(m.file_url),
        file_content_type: Set(m.file_content_type),
        file_size: Set(m.file_size),
        file_updated_at: Set(m.file_updated_at),
        thumbnail_path: Set(m.thumbnail_path),
        thumbnail_url: Set(m.thumbnail_url),
        thumbnail_content_type: Set(m.thumbnail_content_type),
        thumbnail_size: Set(m.thumbnail_size),
        thumbnail_updated_at: Set(m.thumbnail_updated_at),
        original_width: Set(m.original_width),
        original_height: Set(m.original_height),
        original_size: Set(m.original_size),
        original_aspect: Set(m.original_aspect),
        original_duration: Set(m.original_duration),
        small_width: Set(m.small_width),
        small_height: Set(m.small_height),
        small_size: Set(m.small_size),
        small_aspect: Set(m.small_aspect),
        blurhash: Set(m.blurhash),
        error_reason: Set(m.error_reason),
        updated_at: Set(m.updated_at),
        ..Default::default()
    }
}

fn detail_changes(attachment: &MediaAttachment) -> media_attachment::ActiveModel {
    let m = media_attachment::Model::from(attachment);
    media_attachment::ActiveModel {
        description: Set(m.description),
        focus_x: Set(m.focus_x),
        focus_y: Set(m.focus_y),
        status_id: Set(m.status_id),
        updated_at: Set(m.updated_at),
        ..Default::default()
    }
}

#[async_trait]
impl AttachmentStore for MediaAttachmentRepository {
    async fn load(&self, id: &str) -> AppResult<Option<MediaAttachment>> {
        Ok(self.find_by_id(id).await?.map(MediaAttachment::from))
    }

    async fn insert(&self, attachment: &MediaAttachment) -> AppResult<()> {
        let model = media_attachment::Model::from(attachment)
            .into_active_model()
            .reset_all();
        self.create(model).await?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected: ProcessingState,
        attachment: &MediaAttachment,
    ) -> AppResult<bool> {
        MediaAttachmentRepository::compare_and_swap(
            self,
            &attachment.id,
            expected,
            processing_changes(attachment),
        )
        .await
    }

    async fn update_details(&self, attachment: &MediaAttachment) -> AppResult<bool> {
        self.update_columns(&attachment.id, detail_changes(attachment))
            .await
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        MediaAttachmentRepository::delete(self, id).await
    }

    async fn find_by_account(
        &self,
        account_id: &str,
        limit: u64,
    ) -> AppResult<Vec<MediaAttachment>> {
        Ok(MediaAttachmentRepository::find_by_account(self, account_id, limit)
            .await?
            .into_iter()
            .map(MediaAttachment::from)
            .collect())
    }

    async fn find_by_state(
        &self,
        state: ProcessingState,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<MediaAttachment>> {
        Ok(
            MediaAttachmentRepository::find_by_state(self, state, older_than, limit)
                .await?
                .into_iter()
                .map(MediaAttachment::from)
                .collect(),
        )
    }

    async fn find_stalled(
        &self,
        state: ProcessingState,
        updated_before: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<MediaAttachment>> {
        Ok(
            MediaAttachmentRepository::find_stalled(self, state, updated_before, limit)
                .await?
                .into_iter()
                .map(MediaAttachment::from)
                .collect(),
        )
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, Utc};
    use tootbox_db::entities::{MediaKind, ProcessingState};

    use crate::services::media_attachment::{FileMeta, MediaAttachment};

    /// A freshly ingested image upload.
    pub fn received(id: &str, account_id: &str, created_at: DateTime<Utc>) -> MediaAttachment {
        MediaAttachment {
            id: id.to_string(),
            account_id: account_id.to_string(),
            status_id: None,
            kind: MediaKind::Image,
            processing: ProcessingState::Received,
            description: None,
            remote_url: None,
            thumbnail_remote_url: None,
            staging_key: Some(format!("{account_id}/attachment/upload/{id}.png")),
            upload_content_type: "image/png".to_string(),
            original: None,
            thumbnail: None,
            meta: FileMeta::default(),
            blurhash: None,
            error_reason: None,
            created_at,
            updated_at: created_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::media_attachment::Focus;
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_memory_cas_single_winner() {
        let store = MemoryAttachmentStore::new();
        let attachment = fixtures::received("media1", "account1", Utc::now());
        store.insert(&attachment).await.unwrap();

        let mut claimed = attachment.clone();
        claimed.processing = ProcessingState::Processing;

        assert!(store
            .compare_and_swap(ProcessingState::Received, &claimed)
            .await
            .unwrap());
        assert!(!store
            .compare_and_swap(ProcessingState::Received, &claimed)
            .await
            .unwrap());

        let stored = store.load("media1").await.unwrap().unwrap();
        assert_eq!(stored.processing, ProcessingState::Processing);
    }

    #[tokio::test]
    async fn test_memory_writes_do_not_clobber_each_other() {
        let store = MemoryAttachmentStore::new();
        let attachment = fixtures::received("media1", "account1", Utc::now());
        store.insert(&attachment).await.unwrap();

        // A user edits alt text while the worker holds a stale copy.
        let mut edited = attachment.clone();
        edited.description = Some("a cat".to_string());
        edited.meta.focus = Some(Focus { x: 0.1, y: 0.2 });
        assert!(store.update_details(&edited).await.unwrap());

        let mut claimed = attachment;
        claimed.processing = ProcessingState::Processing;
        assert!(store
            .compare_and_swap(ProcessingState::Received, &claimed)
            .await
            .unwrap());

        let stored = store.load("media1").await.unwrap().unwrap();
        assert_eq!(stored.processing, ProcessingState::Processing);
        assert_eq!(stored.description.as_deref(), Some("a cat"));
        assert_eq!(stored.meta.focus, Some(Focus { x: 0.1, y: 0.2 }));
    }

    #[tokio::test]
    async fn test_memory_insert_duplicate_conflicts() {
        let store = MemoryAttachmentStore::new();
        let attachment = fixtures::received("media1", "account1", Utc::now());
        store.insert(&attachment).await.unwrap();
        assert!(store.insert(&attachment).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_find_by_state_oldest_first() {
        let store = MemoryAttachmentStore::new();
        let now = Utc::now();
        for (id, age) in [("new", 1), ("old", 30), ("older", 60)] {
            store
                .insert(&fixtures::received(id, "account1", now - Duration::minutes(age)))
                .await
                .unwrap();
        }

        let stuck = store
            .find_by_state(ProcessingState::Received, now - Duration::minutes(10), 10)
            .await
            .unwrap();
        let ids: Vec<_> = stuck.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["older", "old"]);

        let newest = store.find_by_account("account1", 1).await.unwrap();
        assert_eq!(newest[0].id, "new");
    }

    #[tokio::test]
    async fn test_repository_store_maps_rows() {
        let attachment = fixtures::received("media1", "account1", Utc::now());
        let row = media_attachment::Model::from(&attachment);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[row]])
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );
        let store: AttachmentStoreService = Arc::new(MediaAttachmentRepository::new(db));

        let loaded = store.load("media1").await.unwrap().unwrap();
        assert_eq!(loaded.processing, ProcessingState::Received);
        assert_eq!(loaded.staging_key, attachment.staging_key);

        let mut claimed = loaded;
        claimed.processing = ProcessingState::Processing;
        assert!(!store
            .compare_and_swap(ProcessingState::Received, &claimed)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_repository_store_insert() {
        let attachment = fixtures::received("media1", "account1", Utc::now());
        let row = media_attachment::Model::from(&attachment);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[row]])
                .into_connection(),
        );
        let store: AttachmentStoreService = Arc::new(MediaAttachmentRepository::new(db));

        store.insert(&attachment).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_find_stalled_uses_last_update() {
        let store = MemoryAttachmentStore::new();
        let now = Utc::now();

        // Created long ago but touched recently: not stalled.
        let mut busy = fixtures::received("busy", "account1", now - Duration::hours(3));
        busy.processing = ProcessingState::Processing;
        busy.updated_at = now - Duration::minutes(1);
        // Created recently, claimed and never touched again.
        let mut stuck = fixtures::received("stuck", "account1", now - Duration::hours(2));
        stuck.processing = ProcessingState::Processing;
        stuck.updated_at = now - Duration::hours(2);
        let received = fixtures::received("received", "account1", now - Duration::hours(4));

        for attachment in [&busy, &stuck, &received] {
            store.insert(attachment).await.unwrap();
        }

        let stalled = store
            .find_stalled(ProcessingState::Processing, now - Duration::hours(1), 10)
            .await
            .unwrap();
        let ids: Vec<_> = stalled.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["stuck"]);
    }
}
