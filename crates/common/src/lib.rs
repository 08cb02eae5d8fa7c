//! Common utilities and shared types for tootbox.
//!
//! This crate provides foundational components used across all tootbox crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: ULID-based unique identifiers via [`IdGenerator`]
//! - **Storage**: Blob storage backends (local filesystem, in-memory)
//!
//! # Example
//!
//! ```no_run
//! use tootbox_common::{Config, IdGenerator, AppResult};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let id_gen = IdGenerator::new();
//!     let id = id_gen.generate();
//!     println!("Generated ID {} for {}", id, config.instance.host);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod storage;

pub use config::{Config, MediaSettings, SchedulerSettings, StorageSettings};
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
pub use storage::{
    AttachmentVariant, LocalStorage, MemoryStorage, StorageBackend, StorageService, UploadedFile,
    attachment_key, emoji_key,
};
