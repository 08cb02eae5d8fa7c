//! Queue integration tests.

#![allow(clippy::unwrap_used)]

use std::io::Cursor;
use std::sync::Arc;

use chrono::Utc;
use tootbox_common::{MediaSettings, MemoryStorage, SchedulerSettings};
use tootbox_core::{IngestInput, MediaAttachmentService, MediaService, MemoryAttachmentStore};
use tootbox_db::entities::{MediaKind, ProcessingState};
use tootbox_queue::{JobExecutor, ProcessMediaJob, ScheduledJob, SchedulerConfig, run_job};

fn png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([200, 30, 30]));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

fn service() -> MediaAttachmentService {
    MediaAttachmentService::new(
        Arc::new(MemoryAttachmentStore::new()),
        Arc::new(MemoryStorage::new("https://files.tootbox.test")),
        MediaService::new(MediaSettings::default()),
    )
}

fn upload(data: Vec<u8>) -> IngestInput {
    IngestInput {
        kind: MediaKind::Image,
        content_type: "image/png".to_string(),
        data,
        description: None,
        focus: None,
    }
}

#[tokio::test]
async fn test_requeue_sweep_processes_stuck_uploads_inline() {
    let service = service();
    let id = service.ingest("account1", upload(png())).await.unwrap();

    // Everything received before "now" counts as stuck once the threshold is zero.
    let config = SchedulerConfig::from(&SchedulerSettings {
        requeue_interval_secs: 60,
        requeue_after_secs: 0,
        error_retention_secs: 0,
        processing_timeout_secs: 0,
    });
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let count = run_job(ScheduledJob::RequeueStuckUploads, &config, &service)
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(
        service.get(&id).await.unwrap().processing,
        ProcessingState::Processed
    );

    // Nothing left to pick up.
    let count = run_job(ScheduledJob::RequeueStuckUploads, &config, &service)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_purge_sweep_removes_failed_uploads() {
    let service = service();
    let broken = service
        .ingest("account1", upload(b"not a png".to_vec()))
        .await
        .unwrap();
    let ok = service.ingest("account1", upload(png())).await.unwrap();

    assert_eq!(service.advance(&broken).await.unwrap(), ProcessingState::Error);
    assert_eq!(service.advance(&ok).await.unwrap(), ProcessingState::Processed);

    let purged = service
        .purge_failed_uploads(Utc::now() + chrono::Duration::seconds(1), 10)
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert!(service.get(&broken).await.is_err());
    assert!(service.get(&ok).await.is_ok());
}

#[tokio::test]
async fn test_worker_handles_redelivery() {
    let service = service();
    let id = service.ingest("account1", upload(png())).await.unwrap();
    let ctx = tootbox_queue::MediaWorkerContext::new(service.clone());
    let job = ProcessMediaJob::new(id.clone());

    for _ in 0..3 {
        let state = tootbox_queue::process_media(&job, &ctx).await.unwrap();
        assert_eq!(state, Some(ProcessingState::Processed));
    }
}

/// Pushes a job through Redis.
///
/// Run with: `cargo test --test queue_integration -- --ignored`
/// Set `REDIS_URL` to point to your Redis instance.
#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_redis_media_queue_push() {
    use tootbox_core::MediaProcessingQueue;

    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let client = redis::Client::open(url.as_str()).unwrap();
    let conn = redis::aio::ConnectionManager::new(client).await.unwrap();
    let storage = apalis_redis::RedisStorage::<ProcessMediaJob>::new(conn);

    let queue = tootbox_queue::RedisMediaQueue::new(storage);
    queue.enqueue("01hzxqueuetest").await.unwrap();
}
