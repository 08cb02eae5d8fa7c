//! Emoji repository.

use std::sync::Arc;

use crate::entities::{Emoji, emoji};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, SqlErr,
};
use tootbox_common::{AppError, AppResult};

/// Emoji repository for database operations.
#[derive(Clone)]
pub struct EmojiRepository {
    db: Arc<DatabaseConnection>,
}

fn map_write_err(e: &DbErr) -> AppError {
    match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => {
            AppError::Conflict(format!("Emoji already exists: {detail}"))
        }
        _ => AppError::Database(e.to_string()),
    }
}

impl EmojiRepository {
    /// Create a new emoji repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an emoji by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<emoji::Model>> {
        Emoji::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find an emoji by shortcode and domain (`""` for local).
    pub async fn find_by_shortcode_and_domain(
        &self,
        shortcode: &str,
        domain: &str,
    ) -> AppResult<Option<emoji::Model>> {
        Emoji::find()
            .filter(emoji::Column::Shortcode.eq(shortcode))
            .filter(emoji::Column::Domain.eq(domain))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Enabled emoji from `domain` whose shortcode is one of `shortcodes`.
    pub async fn find_usable(
        &self,
        shortcodes: &[String],
        domain: &str,
    ) -> AppResult<Vec<emoji::Model>> {
        if shortcodes.is_empty() {
            return Ok(vec![]);
        }

        Emoji::find()
            .filter(emoji::Column::Shortcode.is_in(shortcodes.to_vec()))
            .filter(emoji::Column::Domain.eq(domain))
            .filter(emoji::Column::Disabled.eq(false))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Local, enabled emoji shown in the picker, by category then shortcode.
    pub async fn list_picker(&self) -> AppResult<Vec<emoji::Model>> {
        Emoji::find()
            .filter(emoji::Column::Domain.eq(""))
            .filter(emoji::Column::Disabled.eq(false))
            .filter(emoji::Column::VisibleInPicker.eq(true))
            .order_by_asc(emoji::Column::Category)
            .order_by_asc(emoji::Column::Shortcode)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// All categories used by local emoji.
    pub async fn find_categories(&self) -> AppResult<Vec<String>> {
        let categories = Emoji::find()
            .filter(emoji::Column::Domain.eq(""))
            .filter(emoji::Column::Category.is_not_null())
            .select_only()
            .column(emoji::Column::Category)
            .distinct()
            .into_tuple::<Option<String>>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(categories.into_iter().flatten().collect())
    }

    /// Create a new emoji. A duplicate `(shortcode, domain)` or uri is a conflict.
    pub async fn create(&self, model: emoji::ActiveModel) -> AppResult<emoji::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| map_write_err(&e))
    }

    /// Update an emoji.
    pub async fn update(&self, model: emoji::ActiveModel) -> AppResult<emoji::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| map_write_err(&e))
    }

    /// Delete an emoji. Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = Emoji::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_emoji(id: &str, shortcode: &str, domain: &str) -> emoji::Model {
        emoji::Model {
            id: id.to_string(),
            shortcode: shortcode.to_string(),
            domain: domain.to_string(),
            uri: format!("https://example.com/emoji/{id}"),
            image_path: Some(format!("emoji/original/{id}.png")),
            image_url: Some(format!("/files/emoji/original/{id}.png")),
            image_remote_url: None,
            image_static_path: Some(format!("emoji/static/{id}.png")),
            image_static_url: Some(format!("/files/emoji/static/{id}.png")),
            image_static_remote_url: None,
            image_content_type: "image/png".to_string(),
            image_static_content_type: "image/png".to_string(),
            image_file_size: 128,
            image_static_file_size: 128,
            image_updated_at: Utc::now(),
            disabled: false,
            visible_in_picker: true,
            category: Some("blobs".to_string()),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_find_by_shortcode_and_domain() {
        let blob = create_test_emoji("emoji1", "blob_hug", "");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[blob.clone()]])
                .into_connection(),
        );

        let repo = EmojiRepository::new(db);
        let found = repo
            .find_by_shortcode_and_domain("blob_hug", "")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.shortcode, "blob_hug");
        assert!(found.is_local());
    }

    #[tokio::test]
    async fn test_find_usable_empty_input_skips_query() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let repo = EmojiRepository::new(db);
        let found = repo.find_usable(&[], "").await.unwrap();

        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_delete_reports_missing() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                }])
                .into_connection(),
        );

        let repo = EmojiRepository::new(db);
        assert!(!repo.delete("nope").await.unwrap());
    }

    #[test]
    fn test_non_constraint_errors_stay_database_errors() {
        let err = map_write_err(&DbErr::Custom("connection reset".to_string()));
        assert!(matches!(err, AppError::Database(_)));
    }
}
