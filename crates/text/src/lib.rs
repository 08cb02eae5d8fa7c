//! Status text entity extraction.
//!
//! Scans plaintext status bodies for the entities the rest of the server acts
//! on before a status is stored or federated:
//!
//! - **Mentions**: `@user` and `@user@example.org` via [`derive_mentions`]
//! - **Hashtags**: `#tag` via [`derive_hashtags`]
//! - **Custom emoji**: `:shortcode:` via [`derive_emojis`]
//!
//! All extractors deduplicate and keep first-seen order.
//!
//! # Example
//!
//! ```
//! use tootbox_text::{extract_entities, extract_mention_parts};
//!
//! let entities = extract_entities("hi @alice@example.org #Rust :blob:");
//! assert_eq!(entities.mentions, vec!["alice@example.org"]);
//! assert_eq!(entities.hashtags, vec!["rust"]);
//! assert_eq!(entities.emojis, vec!["blob"]);
//!
//! let parts = extract_mention_parts("@alice@example.org").unwrap();
//! assert_eq!(parts.domain(), "example.org");
//! ```

mod error;
mod extract;
mod mention;

pub use error::MalformedMention;
pub use extract::{
    ExtractedEntities, derive_emojis, derive_hashtags, derive_mentions, extract_entities,
};
pub use mention::{MentionParts, extract_mention_parts, is_mention};
