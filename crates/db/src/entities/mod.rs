//! Database entities.

#![allow(missing_docs)]

pub mod emoji;
pub mod media_attachment;
pub mod user;

pub use emoji::Entity as Emoji;
pub use media_attachment::Entity as MediaAttachment;
pub use media_attachment::{MediaKind, ProcessingState};
pub use user::Entity as User;
