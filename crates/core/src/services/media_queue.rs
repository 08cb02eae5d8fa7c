//! Deferred media processing.
//!
//! Ingest only stages the upload; the derivation step runs later, driven by
//! whatever implements [`MediaProcessingQueue`]. The queue crate provides the
//! Redis-backed implementation.

use std::sync::Arc;

use async_trait::async_trait;
use tootbox_common::AppResult;

/// Schedules `advance` for an attachment.
#[async_trait]
pub trait MediaProcessingQueue: Send + Sync {
    /// Queue processing of one attachment.
    async fn enqueue(&self, attachment_id: &str) -> AppResult<()>;
}

/// A queue that drops every job. Attachments stay `Received` until
/// processed inline or requeued.
#[derive(Clone, Default)]
pub struct NoOpMediaQueue;

#[async_trait]
impl MediaProcessingQueue for NoOpMediaQueue {
    async fn enqueue(&self, _attachment_id: &str) -> AppResult<()> {
        Ok(())
    }
}

/// Shared handle to a processing queue.
pub type MediaQueueService = Arc<dyn MediaProcessingQueue>;
