//! Media attachment repository.

use std::sync::Arc;

use crate::entities::{MediaAttachment, ProcessingState, media_attachment};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use tootbox_common::{AppError, AppResult};

/// Media attachment repository for database operations.
#[derive(Clone)]
pub struct MediaAttachmentRepository {
    db: Arc<DatabaseConnection>,
}

impl MediaAttachmentRepository {
    /// Create a new media attachment repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an attachment by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<media_attachment::Model>> {
        MediaAttachment::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a new attachment row.
    pub async fn create(
        &self,
        model: media_attachment::ActiveModel,
    ) -> AppResult<media_attachment::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Apply `changes` to the row only if its processing state is still `expected`.
    ///
    /// Returns `false` when another writer moved the row first (or it is gone).
    pub async fn compare_and_swap(
        &self,
        id: &str,
        expected: ProcessingState,
        changes: media_attachment::ActiveModel,
    ) -> AppResult<bool> {
        let result = MediaAttachment::update_many()
            .set(changes)
            .filter(media_attachment::Column::Id.eq(id))
            .filter(media_attachment::Column::Processing.eq(expected))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }

    /// Apply `changes` to the row regardless of its state.
    ///
    /// Returns `false` when the row does not exist.
    pub async fn update_columns(
        &self,
        id: &str,
        changes: media_attachment::ActiveModel,
    ) -> AppResult<bool> {
        let result = MediaAttachment::update_many()
            .set(changes)
            .filter(media_attachment::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    /// Delete an attachment row. Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = MediaAttachment::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    /// An account's attachments, newest first.
    pub async fn find_by_account(
        &self,
        account_id: &str,
        limit: u64,
    ) -> AppResult<Vec<media_attachment::Model>> {
        MediaAttachment::find()
            .filter(media_attachment::Column::AccountId.eq(account_id))
            .order_by_desc(media_attachment::Column::CreatedAt)
            .order_by_desc(media_attachment::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Attachments sitting in `state` since before `older_than`, oldest first.
    pub async fn find_by_state(
        &self,
        state: ProcessingState,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<media_attachment::Model>> {
        MediaAttachment::find()
            .filter(media_attachment::Column::Processing.eq(state))
            .filter(media_attachment::Column::CreatedAt.lt(older_than))
            .order_by_asc(media_attachment::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Attachments in `state` not updated since `updated_before`, least
    /// recently updated first.
    pub async fn find_stalled(
        &self,
        state: ProcessingState,
        updated_before: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<Vec<media_attachment::Model>> {
        MediaAttachment::find()
            .filter(media_attachment::Column::Processing.eq(state))
            .filter(media_attachment::Column::UpdatedAt.lt(updated_before))
            .order_by_asc(media_attachment::Column::UpdatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::MediaKind;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Set};

    fn create_test_attachment(id: &str, state: ProcessingState) -> media_attachment::Model {
        media_attachment::Model {
            id: id.to_string(),
            account_id: "account1".to_string(),
            status_id: None,
            kind: MediaKind::Image,
            processing: state,
            description: None,
            remote_url: None,
            thumbnail_remote_url: None,
            staging_key: Some(format!("account1/attachment/upload/{id}.png")),
            upload_content_type: "image/png".to_string(),
            file_path: None,
            file_url: None,
            file_content_type: None,
            file_size: None,
            file_updated_at: None,
            thumbnail_path: None,
            thumbnail_url: None,
            thumbnail_content_type: None,
            thumbnail_size: None,
            thumbnail_updated_at: None,
            original_width: None,
            original_height: None,
            original_size: None,
            original_aspect: None,
            original_duration: None,
            small_width: None,
            small_height: None,
            small_size: None,
            small_aspect: None,
            focus_x: None,
            focus_y: None,
            blurhash: None,
            error_reason: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_id_found() {
        let attachment = create_test_attachment("media1", ProcessingState::Received);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[attachment.clone()]])
                .into_connection(),
        );

        let repo = MediaAttachmentRepository::new(db);
        let found = repo.find_by_id("media1").await.unwrap().unwrap();

        assert_eq!(found.id, "media1");
        assert_eq!(found.processing, ProcessingState::Received);
    }

    #[tokio::test]
    async fn test_compare_and_swap_wins() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = MediaAttachmentRepository::new(db);
        let changes = media_attachment::ActiveModel {
            processing: Set(ProcessingState::Processing),
            ..Default::default()
        };

        let swapped = repo
            .compare_and_swap("media1", ProcessingState::Received, changes)
            .await
            .unwrap();

        assert!(swapped);
    }

    #[tokio::test]
    async fn test_compare_and_swap_loses_when_state_moved() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = MediaAttachmentRepository::new(db);
        let changes = media_attachment::ActiveModel {
            processing: Set(ProcessingState::Processing),
            ..Default::default()
        };

        let swapped = repo
            .compare_and_swap("media1", ProcessingState::Received, changes)
            .await
            .unwrap();

        assert!(!swapped);
    }

    #[tokio::test]
    async fn test_update_columns_missing_row() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = MediaAttachmentRepository::new(db);
        let changes = media_attachment::ActiveModel {
            description: Set(Some("alt".to_string())),
            ..Default::default()
        };

        assert!(!repo.update_columns("gone", changes).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_state() {
        let stuck = create_test_attachment("media1", ProcessingState::Received);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[stuck]])
                .into_connection(),
        );

        let repo = MediaAttachmentRepository::new(db);
        let found = repo
            .find_by_state(ProcessingState::Received, Utc::now(), 10)
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "media1");
    }

    #[tokio::test]
    async fn test_find_stalled() {
        let mut stalled = create_test_attachment("media1", ProcessingState::Processing);
        stalled.updated_at = (Utc::now() - chrono::Duration::hours(2)).into();

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[stalled]])
                .into_connection(),
        );

        let repo = MediaAttachmentRepository::new(db);
        let found = repo
            .find_stalled(
                ProcessingState::Processing,
                Utc::now() - chrono::Duration::hours(1),
                10,
            )
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].processing, ProcessingState::Processing);
    }
}
