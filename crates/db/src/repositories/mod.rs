//! Database repositories.

mod emoji;
mod media_attachment;
mod user;

pub use emoji::EmojiRepository;
pub use media_attachment::MediaAttachmentRepository;
pub use user::UserRepository;
