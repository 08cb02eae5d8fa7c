//! Extraction errors.

use thiserror::Error;

/// The input did not match the `@user[@domain]` grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not parse mention {input:?}")]
pub struct MalformedMention {
    /// The rejected input.
    pub input: String,
}

impl MalformedMention {
    pub(crate) fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
        }
    }
}
