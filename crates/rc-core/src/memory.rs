//! In-process implementations of the store ports.
//!
//! Useful for tests and for hosts that keep comments elsewhere and only
//! need the policy for a short-lived batch.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{AuthorIdentity, Comment};
use crate::traits::{CommentQuery, CommentRepo, SortOrder, Target, TargetRepo};

#[derive(Debug, Default)]
pub struct MemoryCommentRepo {
    comments: RwLock<Vec<Comment>>,
}

impl MemoryCommentRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.comments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.comments.read().await.is_empty()
    }
}

#[async_trait]
impl CommentRepo for MemoryCommentRepo {
    async fn insert(&self, comment: Comment) -> anyhow::Result<()> {
        let mut comments = self.comments.write().await;
        if comments.iter().any(|c| c.id == comment.id) {
            anyhow::bail!("comment {} already exists", comment.id);
        }
        comments.push(comment);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Comment>> {
        Ok(self.comments.read().await.iter().find(|c| c.id == id).cloned())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut comments = self.comments.write().await;
        let before = comments.len();
        comments.retain(|c| c.id != id);
        Ok(comments.len() != before)
    }

    async fn latest_matching(
        &self,
        target_id: Uuid,
        identity: AuthorIdentity,
        body: String,
    ) -> anyhow::Result<Option<Comment>> {
        Ok(self
            .comments
            .read()
            .await
            .iter()
            .filter(|c| c.target_id == target_id && c.identity() == identity && c.body == body)
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn list(&self, query: CommentQuery) -> anyhow::Result<Vec<Comment>> {
        let mut matching: Vec<Comment> = self
            .comments
            .read()
            .await
            .iter()
            .filter(|c| query.target_id.map_or(true, |t| c.target_id == t))
            .cloned()
            .collect();
        matching.sort_by_key(|c| c.created_at);
        if query.order == SortOrder::Newest {
            matching.reverse();
        }
        Ok(matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn count(&self, target_id: Option<Uuid>) -> anyhow::Result<u64> {
        let comments = self.comments.read().await;
        Ok(comments
            .iter()
            .filter(|c| target_id.map_or(true, |t| c.target_id == t))
            .count() as u64)
    }
}

#[derive(Debug)]
pub struct MemoryTargetRepo<T> {
    targets: RwLock<HashMap<Uuid, T>>,
}

impl<T> Default for MemoryTargetRepo<T> {
    fn default() -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Target + Clone> MemoryTargetRepo<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the target with the same id.
    pub async fn put(&self, target: T) {
        self.targets.write().await.insert(target.id(), target);
    }
}

#[async_trait]
impl<T: Target + Clone> TargetRepo<T> for MemoryTargetRepo<T> {
    async fn get_target(&self, id: Uuid) -> anyhow::Result<Option<T>> {
        Ok(self.targets.read().await.get(&id).cloned())
    }
}
