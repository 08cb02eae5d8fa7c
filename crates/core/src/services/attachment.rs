//! Media attachment lifecycle service.
//!
//! An upload is staged and recorded as `Received`, then advanced once:
//! `Received → Processing → Processed | Error`. The `Received → Processing`
//! step is a compare-and-swap on the record store, so however many workers
//! call [`MediaAttachmentService::advance`] for the same id, only one of them
//! derives variants and writes them to storage.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tootbox_common::{
    AppError, AppResult, AttachmentVariant, IdGenerator, StorageService, UploadedFile,
    attachment_key,
};
use tootbox_db::entities::{MediaKind, ProcessingState};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::services::attachment_store::AttachmentStoreService;
use crate::services::media::{
    self, DerivedMedia, MediaService, THUMBNAIL_CONTENT_TYPE, THUMBNAIL_EXTENSION,
};
use crate::services::media_attachment::{
    AssetSource, FileMeta, Focus, MediaAttachment, StoredAsset,
};
use crate::services::media_queue::MediaQueueService;

/// Longest accepted alt text, in bytes.
pub const MAX_DESCRIPTION_LENGTH: u64 = 1500;

/// Failure reason recorded by [`MediaAttachmentService::fail_stalled`].
pub const PROCESSING_TIMED_OUT: &str = "processing timed out";

/// A local upload.
#[derive(Debug, Clone, Validate)]
pub struct IngestInput {
    /// Declared kind; must agree with `content_type`.
    pub kind: MediaKind,
    #[validate(length(min = 1, max = 255))]
    pub content_type: String,
    #[validate(length(min = 1, message = "Upload is empty"))]
    pub data: Vec<u8>,
    #[validate(length(max = 1500))]
    pub description: Option<String>,
    #[validate(nested)]
    pub focus: Option<Focus>,
}

/// Media federated in from another server. The bytes have already been
/// fetched.
#[derive(Debug, Clone, Validate)]
pub struct RemoteIngestInput {
    pub kind: MediaKind,
    #[validate(length(min = 1, max = 255))]
    pub content_type: String,
    #[validate(length(min = 1, message = "Upload is empty"))]
    pub data: Vec<u8>,
    #[validate(url)]
    pub remote_url: String,
    #[validate(url)]
    pub thumbnail_remote_url: Option<String>,
    #[validate(length(max = 1500))]
    pub description: Option<String>,
    #[validate(nested)]
    pub focus: Option<Focus>,
}

struct NewAttachment {
    kind: MediaKind,
    content_type: String,
    data: Vec<u8>,
    description: Option<String>,
    focus: Option<Focus>,
    remote_url: Option<String>,
    thumbnail_remote_url: Option<String>,
}

/// Attachment lifecycle service.
#[derive(Clone)]
pub struct MediaAttachmentService {
    store: AttachmentStoreService,
    storage: StorageService,
    media: MediaService,
    queue: Option<MediaQueueService>,
    id_gen: IdGenerator,
}

impl MediaAttachmentService {
    /// Create a new attachment service without a processing queue.
    ///
    /// Without a queue, uploads stay `Received` until [`Self::advance`] is
    /// called directly or [`Self::requeue_received`] picks them up.
    #[must_use]
    pub const fn new(
        store: AttachmentStoreService,
        storage: StorageService,
        media: MediaService,
    ) -> Self {
        Self {
            store,
            storage,
            media,
            queue: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the processing queue.
    pub fn set_queue(&mut self, queue: MediaQueueService) {
        self.queue = Some(queue);
    }

    /// Accept a local upload. Returns the new attachment id as soon as the
    /// upload is staged; processing happens later.
    pub async fn ingest(&self, account_id: &str, input: IngestInput) -> AppResult<String> {
        input.validate()?;
        self.create(
            account_id,
            NewAttachment {
                kind: input.kind,
                content_type: input.content_type,
                data: input.data,
                description: input.description,
                focus: input.focus,
                remote_url: None,
                thumbnail_remote_url: None,
            },
        )
        .await
    }

    /// Accept federated-in media. The original stays at `remote_url`; only
    /// the thumbnail is derived and stored locally.
    pub async fn ingest_remote(
        &self,
        account_id: &str,
        input: RemoteIngestInput,
    ) -> AppResult<String> {
        input.validate()?;
        self.create(
            account_id,
            NewAttachment {
                kind: input.kind,
                content_type: input.content_type,
                data: input.data,
                description: input.description,
                focus: input.focus,
                remote_url: Some(input.remote_url),
                thumbnail_remote_url: input.thumbnail_remote_url,
            },
        )
        .await
    }

    async fn create(&self, account_id: &str, new: NewAttachment) -> AppResult<String> {
        check_kind(new.kind, &new.content_type)?;

        let max_size = self.media.settings().max_upload_size;
        if new.data.len() as u64 > max_size {
            return Err(AppError::Validation(format!(
                "Upload is too large. Maximum size is {max_size} bytes"
            )));
        }

        let id = self.id_gen.generate();
        let extension = media::extension_for_content_type(&new.content_type);
        let staging_key = attachment_key(account_id, &id, AttachmentVariant::Upload, extension);

        self.storage
            .put(&staging_key, &new.data, &new.content_type)
            .await
            .map_err(as_write_error)?;

        let now = Utc::now();
        let attachment = MediaAttachment {
            id: id.clone(),
            account_id: account_id.to_string(),
            status_id: None,
            kind: new.kind,
            processing: ProcessingState::Received,
            description: new.description,
            remote_url: new.remote_url,
            thumbnail_remote_url: new.thumbnail_remote_url,
            staging_key: Some(staging_key.clone()),
            upload_content_type: new.content_type,
            original: None,
            thumbnail: None,
            meta: FileMeta {
                focus: new.focus,
                ..FileMeta::default()
            },
            blurhash: None,
            error_reason: None,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.store.insert(&attachment).await {
            self.remove_blob(&staging_key).await;
            return Err(e);
        }

        info!(
            attachment_id = %id,
            account_id = %account_id,
            kind = %attachment.kind,
            size = new.data.len(),
            "Media attachment received"
        );

        self.enqueue(&id).await;
        Ok(id)
    }

    async fn enqueue(&self, id: &str) {
        let Some(queue) = &self.queue else {
            return;
        };
        if let Err(e) = queue.enqueue(id).await {
            warn!(attachment_id = %id, error = %e, "Failed to queue media processing");
        }
    }

    /// Move an attachment forward if it is still `Received`.
    ///
    /// Safe to call any number of times, concurrently or not. Returns the
    /// state the attachment ended up in. Decode and storage failures are
    /// recorded on the attachment (state `Error`) rather than returned.
    pub async fn advance(&self, id: &str) -> AppResult<ProcessingState> {
        let attachment = self.get(id).await?;
        if attachment.processing != ProcessingState::Received {
            debug!(attachment_id = %id, state = %attachment.processing, "Nothing to advance");
            return Ok(attachment.processing);
        }

        let mut claimed = attachment;
        claimed.processing = ProcessingState::Processing;
        claimed.updated_at = Utc::now();
        if !self
            .store
            .compare_and_swap(ProcessingState::Received, &claimed)
            .await?
        {
            debug!(attachment_id = %id, "Another worker claimed the attachment");
            return Ok(self.get(id).await?.processing);
        }

        let mut written = Vec::new();
        match self.process(&mut claimed, &mut written).await {
            Ok(()) => {
                info!(attachment_id = %id, kind = %claimed.kind, "Media attachment processed");
                Ok(ProcessingState::Processed)
            }
            Err(e) => self.fail(claimed, &e, &written).await,
        }
    }

    async fn process(
        &self,
        attachment: &mut MediaAttachment,
        written: &mut Vec<String>,
    ) -> AppResult<()> {
        let staging_key = attachment
            .staging_key
            .clone()
            .ok_or_else(|| AppError::Internal("No staged upload to process".to_string()))?;
        let data = Arc::new(self.storage.get(&staging_key).await?);

        let derived = self.derive(Arc::clone(&data), attachment.kind).await?;

        let thumbnail_key = attachment_key(
            &attachment.account_id,
            &attachment.id,
            AttachmentVariant::Small,
            THUMBNAIL_EXTENSION,
        );
        let thumbnail = self
            .storage
            .put(&thumbnail_key, &derived.thumbnail, THUMBNAIL_CONTENT_TYPE)
            .await
            .map_err(as_write_error)?;
        written.push(thumbnail_key);

        let now = Utc::now();
        attachment.thumbnail = Some(local_asset(thumbnail, now));
        attachment.meta.small = Some(derived.small);
        attachment.blurhash.clone_from(&derived.blurhash);
        attachment.updated_at = now;
        self.swap_processing(attachment).await?;

        attachment.original = Some(match &attachment.remote_url {
            Some(remote_url) => StoredAsset {
                source: AssetSource::Remote {
                    remote_url: remote_url.clone(),
                },
                content_type: derived.original_content_type.to_string(),
                size: data.len() as u64,
                updated_at: now,
            },
            None => {
                let original_key = attachment_key(
                    &attachment.account_id,
                    &attachment.id,
                    AttachmentVariant::Original,
                    derived.original_extension,
                );
                let original = self
                    .storage
                    .put(&original_key, &data, derived.original_content_type)
                    .await
                    .map_err(as_write_error)?;
                written.push(original_key);
                local_asset(original, Utc::now())
            }
        });

        attachment.processing = ProcessingState::Processed;
        attachment.meta.original = Some(derived.original);
        attachment.staging_key = None;
        attachment.error_reason = None;
        attachment.updated_at = Utc::now();
        self.swap_processing(attachment).await?;

        self.remove_blob(&staging_key).await;
        Ok(())
    }

    async fn derive(&self, data: Arc<Vec<u8>>, kind: MediaKind) -> AppResult<DerivedMedia> {
        let media = self.media.clone();
        tokio::task::spawn_blocking(move || media.derive(&data, kind))
            .await
            .map_err(|e| AppError::Internal(format!("Derivation task failed: {e}")))?
    }

    /// Write `attachment` over a record that must still be `Processing`.
    async fn swap_processing(&self, attachment: &MediaAttachment) -> AppResult<()> {
        if self
            .store
            .compare_and_swap(ProcessingState::Processing, attachment)
            .await?
        {
            Ok(())
        } else {
            Err(AppError::Conflict(format!(
                "Media attachment {} left the processing state",
                attachment.id
            )))
        }
    }

    async fn fail(
        &self,
        mut attachment: MediaAttachment,
        err: &AppError,
        written: &[String],
    ) -> AppResult<ProcessingState> {
        warn!(
            attachment_id = %attachment.id,
            error_code = err.error_code(),
            error = %err,
            "Media processing failed"
        );

        for key in written {
            self.remove_blob(key).await;
        }

        mark_failed(&mut attachment, format!("{}: {err}", err.error_code()));

        if self
            .store
            .compare_and_swap(ProcessingState::Processing, &attachment)
            .await?
        {
            Ok(ProcessingState::Error)
        } else {
            Ok(self.get(&attachment.id).await?.processing)
        }
    }

    /// Get an attachment.
    pub async fn get(&self, id: &str) -> AppResult<MediaAttachment> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Media attachment: {id}")))
    }

    /// An account's attachments, newest first.
    pub async fn list_for_account(
        &self,
        account_id: &str,
        limit: u64,
    ) -> AppResult<Vec<MediaAttachment>> {
        self.store.find_by_account(account_id, limit).await
    }

    async fn get_owned(&self, account_id: &str, id: &str) -> AppResult<MediaAttachment> {
        let attachment = self.get(id).await?;
        if attachment.account_id != account_id {
            return Err(AppError::Forbidden(
                "Media attachment belongs to another account".to_string(),
            ));
        }
        Ok(attachment)
    }

    async fn get_editable(&self, account_id: &str, id: &str) -> AppResult<MediaAttachment> {
        let attachment = self.get_owned(account_id, id).await?;
        if attachment.processing == ProcessingState::Error {
            return Err(AppError::Conflict(
                "Media attachment failed processing and can only be deleted".to_string(),
            ));
        }
        Ok(attachment)
    }

    async fn save_details(&self, mut attachment: MediaAttachment) -> AppResult<MediaAttachment> {
        attachment.updated_at = Utc::now();
        if !self.store.update_details(&attachment).await? {
            return Err(AppError::NotFound(format!(
                "Media attachment: {}",
                attachment.id
            )));
        }
        Ok(attachment)
    }

    /// Set or clear the alt text.
    pub async fn update_description(
        &self,
        account_id: &str,
        id: &str,
        description: Option<String>,
    ) -> AppResult<MediaAttachment> {
        if description
            .as_ref()
            .is_some_and(|d| d.len() as u64 > MAX_DESCRIPTION_LENGTH)
        {
            return Err(AppError::Validation(format!(
                "Description is longer than {MAX_DESCRIPTION_LENGTH} bytes"
            )));
        }

        let mut attachment = self.get_editable(account_id, id).await?;
        attachment.description = description;
        self.save_details(attachment).await
    }

    /// Set or clear the focal point.
    pub async fn update_focus(
        &self,
        account_id: &str,
        id: &str,
        focus: Option<Focus>,
    ) -> AppResult<MediaAttachment> {
        if let Some(focus) = &focus {
            focus.validate()?;
        }

        let mut attachment = self.get_editable(account_id, id).await?;
        attachment.meta.focus = focus;
        self.save_details(attachment).await
    }

    /// Link an attachment to the status that uses it.
    pub async fn attach_to_status(
        &self,
        account_id: &str,
        id: &str,
        status_id: &str,
    ) -> AppResult<MediaAttachment> {
        let mut attachment = self.get_editable(account_id, id).await?;
        match attachment.status_id.as_deref() {
            Some(existing) if existing == status_id => return Ok(attachment),
            Some(_) => {
                return Err(AppError::Conflict(
                    "Media attachment is already used by another status".to_string(),
                ));
            }
            None => {}
        }

        attachment.status_id = Some(status_id.to_string());
        self.save_details(attachment).await
    }

    /// Delete an attachment and its blobs.
    ///
    /// Refused while a worker is processing it.
    pub async fn delete(&self, account_id: &str, id: &str) -> AppResult<()> {
        let attachment = self.get_owned(account_id, id).await?;
        if attachment.processing == ProcessingState::Processing {
            return Err(AppError::Conflict(
                "Media attachment is being processed".to_string(),
            ));
        }

        self.remove(&attachment).await?;
        info!(attachment_id = %id, account_id = %account_id, "Media attachment deleted");
        Ok(())
    }

    async fn remove(&self, attachment: &MediaAttachment) -> AppResult<()> {
        if !self.store.delete(&attachment.id).await? {
            return Err(AppError::NotFound(format!(
                "Media attachment: {}",
                attachment.id
            )));
        }
        for key in attachment.storage_keys() {
            self.remove_blob(&key).await;
        }
        Ok(())
    }

    /// Hand uploads still `Received` since before `older_than` back to the
    /// queue, or process them inline when no queue is configured.
    ///
    /// Returns how many attachments were picked up.
    pub async fn requeue_received(
        &self,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> AppResult<usize> {
        let stuck = self
            .store
            .find_by_state(ProcessingState::Received, older_than, limit)
            .await?;

        for attachment in &stuck {
            if self.queue.is_some() {
                self.enqueue(&attachment.id).await;
            } else if let Err(e) = self.advance(&attachment.id).await {
                warn!(attachment_id = %attachment.id, error = %e, "Inline processing failed");
            }
        }

        if !stuck.is_empty() {
            info!(count = stuck.len(), "Requeued stuck media attachments");
        }
        Ok(stuck.len())
    }

    /// Delete attachments that failed processing before `older_than`.
    ///
    /// Returns how many were removed.
    pub async fn purge_errored(&self, older_than: DateTime<Utc>, limit: u64) -> AppResult<usize> {
        let failed = self
            .store
            .find_by_state(ProcessingState::Error, older_than, limit)
            .await?;

        let mut purged = 0;
        for attachment in &failed {
            match self.remove(attachment).await {
                Ok(()) => purged += 1,
                Err(e) => {
                    warn!(attachment_id = %attachment.id, error = %e, "Failed to purge attachment");
                }
            }
        }

        if purged > 0 {
            info!(count = purged, "Purged failed media attachments");
        }
        Ok(purged)
    }

    /// Fail attachments stuck in `Processing` without an update since
    /// `stalled_since`, as left behind by a worker that died mid-way.
    ///
    /// Derived blobs already on record are removed; the staged upload is kept
    /// so deleting or purging the attachment cleans it up. Returns how many
    /// attachments were failed.
    pub async fn fail_stalled(&self, stalled_since: DateTime<Utc>, limit: u64) -> AppResult<usize> {
        let stalled = self
            .store
            .find_stalled(ProcessingState::Processing, stalled_since, limit)
            .await?;

        let mut failed = 0;
        for attachment in stalled {
            let derived_keys: Vec<String> = [&attachment.original, &attachment.thumbnail]
                .into_iter()
                .flatten()
                .filter_map(|asset| asset.storage_key().map(str::to_string))
                .collect();

            let mut timed_out = attachment;
            mark_failed(&mut timed_out, PROCESSING_TIMED_OUT.to_string());
            if !self
                .store
                .compare_and_swap(ProcessingState::Processing, &timed_out)
                .await?
            {
                debug!(attachment_id = %timed_out.id, "Stalled attachment moved on before the sweep");
                continue;
            }

            warn!(attachment_id = %timed_out.id, "Media processing timed out");
            for key in &derived_keys {
                self.remove_blob(key).await;
            }
            failed += 1;
        }

        if failed > 0 {
            info!(count = failed, "Failed stalled media attachments");
        }
        Ok(failed)
    }

    async fn remove_blob(&self, key: &str) {
        if let Err(e) = self.storage.delete(key).await {
            warn!(key = %key, error = %e, "Failed to remove blob");
        }
    }
}

/// Turn a `Processing` record into its `Error` form. Derived assets are
/// dropped; the staged upload stays on record.
fn mark_failed(attachment: &mut MediaAttachment, reason: String) {
    attachment.processing = ProcessingState::Error;
    attachment.original = None;
    attachment.thumbnail = None;
    attachment.meta.original = None;
    attachment.meta.small = None;
    attachment.blurhash = None;
    attachment.error_reason = Some(reason);
    attachment.updated_at = Utc::now();
}

/// Reject uploads whose declared kind does not match their content type.
fn check_kind(kind: MediaKind, content_type: &str) -> AppResult<()> {
    if kind == MediaKind::Unknown {
        return Err(AppError::Validation(
            "Unsupported media kind".to_string(),
        ));
    }
    let implied = MediaKind::from_content_type(content_type);
    if implied != kind {
        return Err(AppError::Validation(format!(
            "Content type {content_type} does not match media kind {kind}"
        )));
    }
    Ok(())
}

fn local_asset(file: UploadedFile, updated_at: DateTime<Utc>) -> StoredAsset {
    StoredAsset {
        source: AssetSource::Local {
            path: file.key,
            url: file.url,
        },
        content_type: file.content_type,
        size: file.size,
        updated_at,
    }
}

/// Storage backends may report write failures under other variants; the
/// lifecycle records all of them as write errors.
fn as_write_error(err: AppError) -> AppError {
    match err {
        AppError::StorageWrite(_) => err,
        other => AppError::StorageWrite(other.to_string()),
    }
}
