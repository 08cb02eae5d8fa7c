//! Mention resolution.
//!
//! Turns the mentions found in a status body into actors: local mentions are
//! looked up in the account directory, remote ones are passed on with their
//! domain for the federation layer to resolve.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tootbox_common::{AppError, AppResult};
use tootbox_db::repositories::UserRepository;
use tootbox_text::extract_mention_parts;
use tracing::debug;

/// A local account a mention resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    pub id: String,
    /// Username with its original casing.
    pub username: String,
    pub uri: Option<String>,
}

/// Looks up local accounts by username.
#[async_trait]
pub trait LocalActorDirectory: Send + Sync {
    /// Find a local account that may be mentioned. Lookup ignores case.
    async fn resolve_local(&self, username: &str) -> AppResult<Option<ActorRef>>;
}

/// Shared handle to a local actor directory.
pub type ActorDirectoryService = Arc<dyn LocalActorDirectory>;

#[async_trait]
impl LocalActorDirectory for UserRepository {
    async fn resolve_local(&self, username: &str) -> AppResult<Option<ActorRef>> {
        Ok(self
            .find_local_by_username(username)
            .await?
            .filter(|user| !user.is_suspended)
            .map(|user| ActorRef {
                id: user.id,
                username: user.username,
                uri: user.uri,
            }))
    }
}

/// A mention after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMention {
    pub username: String,
    /// `""` for local accounts, otherwise the lower-cased domain.
    pub domain: String,
    /// The local account, when the mention is local.
    pub actor: Option<ActorRef>,
}

impl ResolvedMention {
    /// Whether the mention names a local account.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.domain.is_empty()
    }

    /// `user` for local accounts, `user@domain` otherwise.
    #[must_use]
    pub fn acct(&self) -> String {
        if self.is_local() {
            self.username.clone()
        } else {
            format!("{}@{}", self.username, self.domain)
        }
    }
}

/// Outcome of resolving every mention of a status.
#[derive(Debug, Default)]
pub struct MentionResolution {
    /// Resolved mentions, first-seen order, one per account.
    pub resolved: Vec<ResolvedMention>,
    /// Mentions that could not be resolved, with the reason.
    pub failed: Vec<(String, AppError)>,
}

/// Mention resolver.
#[derive(Clone)]
pub struct MentionService {
    local_host: String,
    directory: ActorDirectoryService,
}

impl MentionService {
    /// Create a resolver for the instance at `local_host`.
    #[must_use]
    pub fn new(local_host: &str, directory: ActorDirectoryService) -> Self {
        Self {
            local_host: local_host.to_ascii_lowercase(),
            directory,
        }
    }

    /// Resolve `@user`, `@user@domain` or the bare `user[@domain]` form the
    /// extractor returns.
    ///
    /// A mention addressed to this instance's own host counts as local.
    pub async fn resolve(&self, raw: &str) -> AppResult<ResolvedMention> {
        let raw = raw.trim();
        let parts = if raw.starts_with('@') {
            extract_mention_parts(raw)
        } else {
            extract_mention_parts(&format!("@{raw}"))
        }
        .map_err(|e| AppError::MalformedMention(e.input))?;

        let is_local = parts
            .host
            .as_deref()
            .is_none_or(|host| host.eq_ignore_ascii_case(&self.local_host));

        if !is_local {
            return Ok(ResolvedMention {
                domain: parts.domain().to_ascii_lowercase(),
                username: parts.username,
                actor: None,
            });
        }

        match self.directory.resolve_local(&parts.username).await? {
            Some(actor) => Ok(ResolvedMention {
                username: actor.username.clone(),
                domain: String::new(),
                actor: Some(actor),
            }),
            None => Err(AppError::UnknownActor(format!("@{}", parts.username))),
        }
    }

    /// Resolve every mention, collecting failures instead of stopping at the
    /// first one. Mentions of the same account are merged.
    pub async fn resolve_all(&self, mentions: &[String]) -> MentionResolution {
        let mut resolution = MentionResolution::default();

        for raw in mentions {
            match self.resolve(raw).await {
                Ok(mention) => {
                    let acct = mention.acct().to_lowercase();
                    if !resolution
                        .resolved
                        .iter()
                        .any(|m| m.acct().to_lowercase() == acct)
                    {
                        resolution.resolved.push(mention);
                    }
                }
                Err(e) => {
                    debug!(mention = %raw, error = %e, "Mention not resolved");
                    resolution.failed.push((raw.clone(), e));
                }
            }
        }

        resolution
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::collections::HashMap;
    use tootbox_db::entities::user;

    struct Directory(HashMap<String, ActorRef>);

    #[async_trait]
    impl LocalActorDirectory for Directory {
        async fn resolve_local(&self, username: &str) -> AppResult<Option<ActorRef>> {
            Ok(self.0.get(&username.to_lowercase()).cloned())
        }
    }

    fn service() -> MentionService {
        let alice = ActorRef {
            id: "user1".to_string(),
            username: "Alice".to_string(),
            uri: None,
        };
        let directory = Directory(HashMap::from([("alice".to_string(), alice)]));
        MentionService::new("Tootbox.Test", Arc::new(directory))
    }

    #[tokio::test]
    async fn test_resolve_local() {
        let resolved = service().resolve("@alice").await.unwrap();
        assert!(resolved.is_local());
        assert_eq!(resolved.domain, "");
        assert_eq!(resolved.username, "Alice");
        assert_eq!(resolved.actor.unwrap().id, "user1");
    }

    #[tokio::test]
    async fn test_resolve_own_domain_is_local() {
        let resolved = service().resolve("@ALICE@tootbox.test").await.unwrap();
        assert!(resolved.is_local());
        assert_eq!(resolved.acct(), "Alice");
    }

    #[tokio::test]
    async fn test_resolve_accepts_bare_form() {
        let resolved = service().resolve("bob@Example.ORG").await.unwrap();
        assert!(!resolved.is_local());
        assert_eq!(resolved.username, "bob");
        assert_eq!(resolved.domain, "example.org");
        assert_eq!(resolved.actor, None);
    }

    #[tokio::test]
    async fn test_resolve_unknown_local() {
        assert!(matches!(
            service().resolve("@nobody").await,
            Err(AppError::UnknownActor(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_malformed() {
        for raw in ["not a mention", "@", "@alice@", "@al ice"] {
            assert!(
                matches!(
                    service().resolve(raw).await,
                    Err(AppError::MalformedMention(_))
                ),
                "{raw}"
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_all_collects_failures() {
        let mentions = vec![
            "alice".to_string(),
            "bob@example.org".to_string(),
            "nobody".to_string(),
            "ALICE@tootbox.test".to_string(),
        ];

        let resolution = service().resolve_all(&mentions).await;

        let accts: Vec<_> = resolution.resolved.iter().map(ResolvedMention::acct).collect();
        assert_eq!(accts, vec!["Alice", "bob@example.org"]);
        assert_eq!(resolution.failed.len(), 1);
        assert_eq!(resolution.failed[0].0, "nobody");
        assert!(matches!(resolution.failed[0].1, AppError::UnknownActor(_)));
    }

    #[tokio::test]
    async fn test_user_repository_skips_suspended() {
        let suspended = user::Model {
            id: "user2".to_string(),
            username: "carol".to_string(),
            username_lower: "carol".to_string(),
            host: None,
            uri: None,
            is_suspended: true,
            created_at: Utc::now().into(),
        };
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[suspended]])
                .into_connection(),
        );

        let service = MentionService::new("tootbox.test", Arc::new(UserRepository::new(db)));
        assert!(matches!(
            service.resolve("@carol").await,
            Err(AppError::UnknownActor(_))
        ));
    }
}
