//! Media processing worker.

use apalis::prelude::*;
use tootbox_common::{AppError, AppResult};
use tootbox_core::MediaAttachmentService;
use tootbox_db::entities::ProcessingState;
use tracing::{error, info, warn};

use crate::jobs::ProcessMediaJob;

/// Context for the media processing worker.
#[derive(Clone)]
pub struct MediaWorkerContext {
    /// Attachment service the worker advances records through.
    pub attachments: MediaAttachmentService,
}

impl MediaWorkerContext {
    /// Create a new worker context.
    #[must_use]
    pub const fn new(attachments: MediaAttachmentService) -> Self {
        Self { attachments }
    }
}

/// Advance the attachment named by `job`.
///
/// Returns `None` when the attachment no longer exists; there is nothing to
/// retry in that case.
pub async fn process_media(
    job: &ProcessMediaJob,
    ctx: &MediaWorkerContext,
) -> AppResult<Option<ProcessingState>> {
    match ctx.attachments.advance(&job.attachment_id).await {
        Ok(state) => Ok(Some(state)),
        Err(AppError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Worker function for processing media.
///
/// Decode and storage failures end up on the attachment itself, so only
/// infrastructure errors (database, queue) fail the job and get retried.
///
/// # Errors
/// Returns an error if the attachment record could not be read or written.
pub async fn process_media_worker(
    job: ProcessMediaJob,
    ctx: Data<MediaWorkerContext>,
) -> Result<(), Error> {
    match process_media(&job, &ctx).await {
        Ok(Some(state)) => {
            info!(attachment_id = %job.attachment_id, state = %state, "Media job finished");
            Ok(())
        }
        Ok(None) => {
            warn!(attachment_id = %job.attachment_id, "Attachment gone, dropping media job");
            Ok(())
        }
        Err(e) => {
            error!(attachment_id = %job.attachment_id, error = %e, "Media job failed");
            let err: Box<dyn std::error::Error + Send + Sync> = Box::new(e);
            Err(Error::Failed(err.into()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;
    use tootbox_common::{MediaSettings, MemoryStorage};
    use tootbox_core::{IngestInput, MediaService, MemoryAttachmentStore};
    use tootbox_db::entities::MediaKind;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 120, 200]));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn context() -> MediaWorkerContext {
        MediaWorkerContext::new(MediaAttachmentService::new(
            Arc::new(MemoryAttachmentStore::new()),
            Arc::new(MemoryStorage::new("https://files.tootbox.test")),
            MediaService::new(MediaSettings::default()),
        ))
    }

    #[tokio::test]
    async fn test_process_media_advances_attachment() {
        let ctx = context();
        let id = ctx
            .attachments
            .ingest(
                "account1",
                IngestInput {
                    kind: MediaKind::Image,
                    content_type: "image/png".to_string(),
                    data: png(24, 12),
                    description: None,
                    focus: None,
                },
            )
            .await
            .unwrap();

        let job = ProcessMediaJob::new(id.clone());
        assert_eq!(
            process_media(&job, &ctx).await.unwrap(),
            Some(ProcessingState::Processed)
        );
        // Redelivery of the same job is harmless.
        assert_eq!(
            process_media(&job, &ctx).await.unwrap(),
            Some(ProcessingState::Processed)
        );
    }

    #[tokio::test]
    async fn test_process_media_missing_attachment() {
        let ctx = context();
        let job = ProcessMediaJob::new("missing".to_string());
        assert_eq!(process_media(&job, &ctx).await.unwrap(), None);
    }
}
