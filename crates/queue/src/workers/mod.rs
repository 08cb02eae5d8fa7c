//! Job workers.

mod process_media;

pub use process_media::{MediaWorkerContext, process_media, process_media_worker};
