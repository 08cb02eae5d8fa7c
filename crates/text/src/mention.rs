//! Mention parsing.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MalformedMention;
use crate::extract::HOST_PATTERN;

#[allow(clippy::unwrap_used)]
static MENTION_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^@([A-Za-z0-9_]+)(?:@({HOST_PATTERN}))?$")).unwrap()
});

/// A parsed `@user[@domain]` mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionParts {
    /// Username, case preserved.
    pub username: String,
    /// Domain, `None` for a local mention.
    pub host: Option<String>,
}

impl MentionParts {
    /// Domain, or `""` for a local mention.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.host.as_deref().unwrap_or_default()
    }

    /// Whether the mention names no domain.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        self.host.is_none()
    }
}

impl fmt::Display for MentionParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) => write!(f, "@{}@{host}", self.username),
            None => write!(f, "@{}", self.username),
        }
    }
}

/// Whether the whole string is a mention such as `@user@example.org`.
#[must_use]
pub fn is_mention(s: &str) -> bool {
    MENTION_NAME_RE.is_match(&s.to_lowercase())
}

/// Split `@user@example.org` into its username and domain.
///
/// The whole input must match; text that merely contains a mention is
/// rejected.
pub fn extract_mention_parts(s: &str) -> Result<MentionParts, MalformedMention> {
    let caps = MENTION_NAME_RE
        .captures(s)
        .ok_or_else(|| MalformedMention::new(s))?;

    let username = caps
        .get(1)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| MalformedMention::new(s))?;
    let host = caps.get(2).map(|m| m.as_str().to_string());

    Ok(MentionParts { username, host })
}
