//! Entity extractors.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A hostname: dot-separated labels of letters, digits and inner hyphens.
pub(crate) const HOST_PATTERN: &str =
    r"[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)*";

// The `regex` crate has no lookbehind, so the boundary character is consumed
// by a non-capturing group and the entity is read from group 1.
#[allow(clippy::unwrap_used)]
static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:^|[^\w@./])@([A-Za-z0-9_]+(?:@{HOST_PATTERN})?)"
    ))
    .unwrap()
});

#[allow(clippy::unwrap_used)]
static HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\w#&/])#([\p{L}\p{M}\p{N}_]+)").unwrap());

#[allow(clippy::unwrap_used)]
static EMOJI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\B:([A-Za-z0-9_]+):\B").unwrap());

/// Everything extracted from one status body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    /// `user` or `user@domain`, without the leading `@`.
    pub mentions: Vec<String>,
    /// Lower-cased tags, without the leading `#`.
    pub hashtags: Vec<String>,
    /// Shortcodes, without the surrounding colons.
    pub emojis: Vec<String>,
}

fn unique(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn captures(re: &Regex, text: &str) -> impl Iterator<Item = String> {
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Accounts mentioned in a plaintext status.
///
/// Returns `user` for local mentions and `user@domain` for remote ones. Case
/// is preserved; an `@` glued to a word, a dot or a slash (e-mail addresses,
/// URL paths) is not a mention.
#[must_use]
pub fn derive_mentions(text: &str) -> Vec<String> {
    unique(captures(&MENTION_RE, text))
}

/// Hashtags used in a plaintext status, lower-cased.
///
/// A tag is any run of Unicode letters, combining marks, digits and
/// underscores, so `#café` and `#日本語` are tags while `#foo-bar` is `foo`.
#[must_use]
pub fn derive_hashtags(text: &str) -> Vec<String> {
    unique(captures(&HASHTAG_RE, text).map(|tag| tag.to_lowercase()))
}

/// Custom emoji shortcodes used in a plaintext status.
#[must_use]
pub fn derive_emojis(text: &str) -> Vec<String> {
    unique(captures(&EMOJI_RE, text))
}

/// Run all three extractors over one status body.
#[must_use]
pub fn extract_entities(text: &str) -> ExtractedEntities {
    ExtractedEntities {
        mentions: derive_mentions(text),
        hashtags: derive_hashtags(text),
        emojis: derive_emojis(text),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mentions_local_and_remote() {
        assert_eq!(
            derive_mentions("hello @alice@example.org and @bob"),
            vec!["alice@example.org", "bob"]
        );
    }

    #[test]
    fn test_mentions_deduplicated_in_first_seen_order() {
        assert_eq!(
            derive_mentions("@bob @alice @bob @alice@example.org @bob"),
            vec!["bob", "alice", "alice@example.org"]
        );
    }

    #[test]
    fn test_mentions_preserve_case() {
        assert_eq!(derive_mentions("cc @Alice"), vec!["Alice"]);
        assert_eq!(derive_mentions("cc @Alice @alice"), vec!["Alice", "alice"]);
    }

    #[test]
    fn test_mentions_skip_email_and_url_paths() {
        assert!(derive_mentions("mail me at bob@example.org").is_empty());
        assert!(derive_mentions("see https://example.org/@alice").is_empty());
        assert!(derive_mentions("not a mention: .@x").is_empty());
    }

    #[test]
    fn test_mentions_trailing_punctuation() {
        assert_eq!(
            derive_mentions("thanks @alice@example.org."),
            vec!["alice@example.org"]
        );
        assert_eq!(derive_mentions("(@bob)"), vec!["bob"]);
    }

    #[test]
    fn test_mentions_at_start_and_adjacent() {
        assert_eq!(derive_mentions("@a,@b\n@c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_hashtags_lowercased_and_deduplicated() {
        assert_eq!(
            derive_hashtags("Check #FOO and #foo and #bar"),
            vec!["foo", "bar"]
        );
    }

    #[test]
    fn test_hashtags_unicode_charset() {
        assert_eq!(
            derive_hashtags("#Café #日本語 #snake_case #tag2"),
            vec!["café", "日本語", "snake_case", "tag2"]
        );
        // punctuation ends a tag
        assert_eq!(derive_hashtags("#foo-bar"), vec!["foo"]);
    }

    #[test]
    fn test_hashtags_skip_anchors_and_entities() {
        assert!(derive_hashtags("https://example.org/#section").is_empty());
        assert!(derive_hashtags("word#tag").is_empty());
        assert!(derive_hashtags("&#123;").is_empty());
        assert!(derive_hashtags("##double").is_empty());
    }

    #[test]
    fn test_emojis() {
        assert_eq!(
            derive_emojis("nice :blob_hug: and :blob_hug:"),
            vec!["blob_hug"]
        );
        assert_eq!(derive_emojis(":a::b:"), vec!["a", "b"]);
        assert!(derive_emojis("time is 12:30:45").is_empty());
        assert!(derive_emojis("no :spaces here:").is_empty());
    }

    #[test]
    fn test_extract_entities() {
        let entities = extract_entities("@alice look at #Rust :ferris: with @bob@example.org");
        assert_eq!(entities.mentions, vec!["alice", "bob@example.org"]);
        assert_eq!(entities.hashtags, vec!["rust"]);
        assert_eq!(entities.emojis, vec!["ferris"]);
    }

    #[test]
    fn test_extract_entities_empty() {
        assert_eq!(extract_entities(""), ExtractedEntities::default());
    }

    #[test]
    fn test_extracted_entities_serialize() {
        let json = serde_json::to_value(extract_entities("#a")).unwrap();
        assert_eq!(json["hashtags"][0], "a");
        assert_eq!(json["mentions"].as_array().map(Vec::len), Some(0));
    }
}
