//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `tootbox_test`)
//!   `TEST_DB_PASSWORD` (default: `tootbox_test`)

#![allow(clippy::unwrap_used)]

use chrono::Utc;
use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};
use tootbox_common::AppError;
use tootbox_db::entities::{MediaKind, ProcessingState, emoji, media_attachment, user};
use tootbox_db::repositories::{EmojiRepository, MediaAttachmentRepository, UserRepository};
use tootbox_db::test_utils::TestDatabase;

async fn seed_user(db: &TestDatabase, id: &str, username: &str) -> user::Model {
    user::Model {
        id: id.to_string(),
        username: username.to_string(),
        username_lower: username.to_lowercase(),
        host: None,
        uri: None,
        is_suspended: false,
        created_at: Utc::now().into(),
    }
    .into_active_model()
    .reset_all()
    .insert(db.connection())
    .await
    .unwrap()
}

fn received_attachment(id: &str, account_id: &str) -> media_attachment::Model {
    media_attachment::Model {
        id: id.to_string(),
        account_id: account_id.to_string(),
        status_id: None,
        kind: MediaKind::Image,
        processing: ProcessingState::Received,
        description: None,
        remote_url: None,
        thumbnail_remote_url: None,
        staging_key: None,
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
#[ignore = "requires running PostgreSQL instance"]
async fn test_compare_and_swap_admits_one_winner() {
    let db = TestDatabase::create_unique().await.unwrap();
    seed_user(&db, "account1", "alice").await;

    let repo = MediaAttachmentRepository::new(db.shared_connection().await.unwrap());
    repo.create(received_attachment("media1", "account1").into_active_model().reset_all())
        .await
        .unwrap();

    let claim = media_attachment::ActiveModel {
        processing: Set(ProcessingState::Processing),
        ..Default::default()
    };

    assert!(repo
        .compare_and_swap("media1", ProcessingState::Received, claim.clone())
        .await
        .unwrap());
    assert!(!repo
        .compare_and_swap("media1", ProcessingState::Received, claim)
        .await
        .unwrap());

    let stored = repo.find_by_id("media1").await.unwrap().unwrap();
    assert_eq!(stored.processing, ProcessingState::Processing);

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_duplicate_emoji_is_conflict() {
    let db = TestDatabase::create_unique().await.unwrap();
    let repo = EmojiRepository::new(db.shared_connection().await.unwrap());

    let make = |id: &str| emoji::Model {
        id: id.to_string(),
        shortcode: "blob".to_string(),
        domain: String::new(),
        uri: format!("https://tootbox.test/emoji/{id}"),
        image_path: None,
        image_url: None,
        image_remote_url: None,
        image_static_path: None,
        image_static_url: None,
        image_static_remote_url: None,
        image_content_type: "image/png".to_string(),
        image_static_content_type: "image/png".to_string(),
        image_file_size: 0,
        image_static_file_size: 0,
        image_updated_at: Utc::now(),
        disabled: false,
        visible_in_picker: true,
        category: None,
        created_at: Utc::now(),
        updated_at: None,
    };

    repo.create(make("emoji1").into_active_model().reset_all())
        .await
        .unwrap();
    let second = repo
        .create(make("emoji2").into_active_model().reset_all())
        .await;

    assert!(matches!(second, Err(AppError::Conflict(_))));

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_local_user_lookup_ignores_case() {
    let db = TestDatabase::create_unique().await.unwrap();
    seed_user(&db, "user1", "Alice").await;

    let repo = UserRepository::new(db.shared_connection().await.unwrap());
    let found = repo.find_local_by_username("alice").await.unwrap();
    assert_eq!(found.map(|u| u.id), Some("user1".to_string()));

    db.drop_database().await.unwrap();
}
