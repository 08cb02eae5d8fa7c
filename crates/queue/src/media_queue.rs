//! Redis-backed media processing queue.
//!
//! Implements the core crate's `MediaProcessingQueue` by pushing
//! [`ProcessMediaJob`]s for the apalis media worker.

use apalis::prelude::*;
use async_trait::async_trait;
use tootbox_common::{AppError, AppResult};
use tootbox_core::MediaProcessingQueue;

use crate::jobs::ProcessMediaJob;

/// Redis-backed media processing queue.
#[derive(Clone)]
pub struct RedisMediaQueue {
    /// Redis storage for job queue (apalis-redis).
    storage: apalis_redis::RedisStorage<ProcessMediaJob>,
}

impl RedisMediaQueue {
    /// Create a new Redis media queue.
    #[must_use]
    pub const fn new(storage: apalis_redis::RedisStorage<ProcessMediaJob>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl MediaProcessingQueue for RedisMediaQueue {
    async fn enqueue(&self, attachment_id: &str) -> AppResult<()> {
        self.storage
            .clone()
            .push(ProcessMediaJob::new(attachment_id.to_string()))
            .await
            .map_err(|e| AppError::Queue(format!("Failed to queue media job: {e}")))?;

        tracing::debug!(attachment_id = %attachment_id, "Queued media processing job");
        Ok(())
    }
}
