//! Media processing job.

use serde::{Deserialize, Serialize};

/// Job to advance one media attachment through processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMediaJob {
    /// The attachment to process.
    pub attachment_id: String,
}

impl ProcessMediaJob {
    /// Create a new processing job.
    #[must_use]
    pub const fn new(attachment_id: String) -> Self {
        Self { attachment_id }
    }
}
