//! Job definitions.

#![allow(missing_docs)]

mod process_media;

pub use process_media::ProcessMediaJob;
