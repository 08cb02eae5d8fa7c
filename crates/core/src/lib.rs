//! Core business logic for tootbox.
//!
//! - [`MediaAttachmentService`] runs uploads through
//!   `Received → Processing → Processed | Error`, using [`MediaService`] to
//!   derive metadata, thumbnails and blurhashes.
//! - [`MentionService`] resolves the mentions extracted from status text.
//! - [`EmojiService`] manages custom emoji.

pub mod services;

pub use services::*;
