//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be wired into a configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AuthorIdentity, Comment, User};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Anything that can receive comments.
pub trait Target: Send + Sync + 'static {
    fn id(&self) -> Uuid;

    /// Human readable type name, passed to notifications.
    fn verbose_name(&self) -> &str {
        "target"
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Oldest first
    #[default]
    Oldest,
    Newest,
}

/// Filtered, ordered and windowed listing of comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentQuery {
    pub target_id: Option<Uuid>,
    pub order: SortOrder,
    pub limit: u32,
    pub offset: u32,
}

/// Data persistence contract for comments.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn insert(&self, comment: Comment) -> anyhow::Result<()>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Comment>>;
    /// Returns false when nothing was deleted.
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Most recent comment on `target_id` by `identity` with exactly `body`.
    async fn latest_matching(
        &self,
        target_id: Uuid,
        identity: AuthorIdentity,
        body: String,
    ) -> anyhow::Result<Option<Comment>>;

    async fn list(&self, query: CommentQuery) -> anyhow::Result<Vec<Comment>>;
    async fn count(&self, target_id: Option<Uuid>) -> anyhow::Result<u64>;
}

/// Lookup contract for the records comments attach to.
#[async_trait]
pub trait TargetRepo<T: Target>: Send + Sync {
    async fn get_target(&self, id: Uuid) -> anyhow::Result<Option<T>>;
}

/// What an external classifier gets to see about a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassifierInput {
    pub body: String,
    pub author_name: String,
    pub author_email: String,
    pub author_website: String,
    pub user_ip: String,
    pub user_agent: String,
    pub referrer: String,
}

/// External spam-classification service.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait SpamClassifier: Send + Sync {
    async fn is_spam(&self, input: ClassifierInput) -> anyhow::Result<bool>;
}

/// Payload handed to a notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationContext {
    pub comment: Comment,
    pub verbose_name: String,
}

/// Outbound notification channel. Failures are logged, never propagated.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        recipients: Vec<Uuid>,
        label: String,
        context: NotificationContext,
    ) -> anyhow::Result<()>;
}

/// Host-provided authorization check.
#[cfg_attr(any(test, feature = "testing"), automock)]
pub trait PermissionChecker: Send + Sync {
    fn has_perm(&self, user: &User, permission: &str) -> bool;
}
