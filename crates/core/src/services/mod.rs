//! Business logic services.

#![allow(missing_docs)]

pub mod attachment;
pub mod attachment_store;
pub mod custom_emoji;
pub mod emoji;
pub mod media;
pub mod media_attachment;
pub mod media_queue;
pub mod mention;
pub mod probe;

pub use attachment::{IngestInput, MediaAttachmentService, RemoteIngestInput};
pub use attachment_store::{AttachmentStore, AttachmentStoreService, MemoryAttachmentStore};
pub use custom_emoji::CustomEmoji;
pub use emoji::{CreateEmojiInput, EmojiService, RemoteEmojiInput};
pub use media::{DerivedMedia, ImageFormat, MediaService};
pub use media_attachment::{AssetSource, FileMeta, Focus, MediaAttachment, StoredAsset, VariantMeta};
pub use media_queue::{MediaProcessingQueue, MediaQueueService, NoOpMediaQueue};
pub use mention::{
    ActorDirectoryService, ActorRef, LocalActorDirectory, MentionResolution, MentionService,
    ResolvedMention,
};
