//! Articles: the stock commentable record shipped with the SQLite backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rc_core::policy::{CommentPolicy, PolicyBuilder, PolicySettings};
use rc_core::traits::{Target, TargetRepo};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use crate::{blob_to_uuid, from_micros, to_micros, uuid_to_blob};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub owner_id: Option<Uuid>,
    pub allow_comments: bool,
    pub pub_date: DateTime<Utc>,
}

impl Article {
    pub fn new(title: impl Into<String>, owner_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::now_v7(),
            title: title.into(),
            owner_id,
            allow_comments: true,
            pub_date: Utc::now(),
        }
    }
}

impl Target for Article {
    fn id(&self) -> Uuid {
        self.id
    }

    fn verbose_name(&self) -> &str {
        "article"
    }
}

/// A policy builder with the article hooks already in place: comments follow
/// the `allow_comments` flag, age is counted from `pub_date` and the owner is
/// notified.
pub fn article_policy(settings: PolicySettings) -> PolicyBuilder<Article> {
    CommentPolicy::builder(settings)
        .comments_enabled(|article: &Article| article.allow_comments)
        .published_at(|article: &Article| article.pub_date)
        .target_owner(|article: &Article| article.owner_id)
}

#[derive(Debug, Clone)]
pub struct SqliteArticleRepo {
    pool: SqlitePool,
}

impl SqliteArticleRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &SqliteRow) -> anyhow::Result<Article> {
        let owner_id = row
            .try_get::<Option<Vec<u8>>, _>("owner_id")?
            .map(|blob| blob_to_uuid(&blob))
            .transpose()?;
        Ok(Article {
            id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("id")?)?,
            title: row.try_get("title")?,
            owner_id,
            allow_comments: row.try_get("allow_comments")?,
            pub_date: from_micros(row.try_get("pub_date")?)?,
        })
    }

    pub async fn create(&self, article: &Article) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO articles (id, title, owner_id, allow_comments, pub_date)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(article.id))
        .bind(&article.title)
        .bind(article.owner_id.map(uuid_to_blob))
        .bind(article.allow_comments)
        .bind(to_micros(article.pub_date))
        .execute(&self.pool)
        .await?;
        tracing::info!(article_id = %article.id, "article created");
        Ok(())
    }

    /// Returns false when no such article exists.
    pub async fn set_allow_comments(&self, id: Uuid, allow: bool) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE articles SET allow_comments = ? WHERE id = ?")
            .bind(allow)
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list(&self) -> anyhow::Result<Vec<Article>> {
        sqlx::query("SELECT * FROM articles ORDER BY pub_date DESC")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(Self::map_row)
            .collect()
    }
}

#[async_trait]
impl TargetRepo<Article> for SqliteArticleRepo {
    async fn get_target(&self, id: Uuid) -> anyhow::Result<Option<Article>> {
        let row = sqlx::query("SELECT * FROM articles WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use rc_core::configuration::{CommentConfiguration, PolicyBinding, SubmitOutcome};
    use rc_core::request::CommentRequest;
    use rc_core::traits::CommentRepo;
    use rc_core::CommentError;

    use super::*;
    use crate::{connect, SqliteCommentRepo};

    async fn setup() -> (SqliteArticleRepo, SqliteCommentRepo) {
        let pool = connect("sqlite::memory:").await.unwrap();
        (
            SqliteArticleRepo::new(pool.clone()),
            SqliteCommentRepo::new(pool, "articlecomment"),
        )
    }

    fn submission(body: &str) -> CommentRequest {
        CommentRequest::post([
            ("author_name", "Guest"),
            ("author_email", "guest@example.com"),
            ("body", body),
        ])
    }

    #[tokio::test]
    async fn test_article_roundtrip() {
        let (articles, _) = setup().await;
        let owner = Uuid::now_v7();
        let article = Article::new("Hello", Some(owner));
        articles.create(&article).await.unwrap();

        let stored = articles.get_target(article.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Hello");
        assert_eq!(stored.owner_id, Some(owner));
        assert!(stored.allow_comments);

        assert!(articles.set_allow_comments(article.id, false).await.unwrap());
        assert!(!articles.get_target(article.id).await.unwrap().unwrap().allow_comments);
        assert!(!articles.set_allow_comments(Uuid::now_v7(), false).await.unwrap());
        assert_eq!(articles.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_stored_once() {
        let (articles, comments) = setup().await;
        let article = Article::new("Hello", None);
        articles.create(&article).await.unwrap();

        let comments = Arc::new(comments);
        let policy = article_policy(PolicySettings::default()).build().unwrap();
        let binding = PolicyBinding::new(policy, comments.clone(), Arc::new(articles));

        let first = binding.submit(&submission("first!"), article.id).await.unwrap();
        let second = binding.submit(&submission("first!"), article.id).await.unwrap();
        match (first, second) {
            (
                SubmitOutcome::Posted { comment: a, duplicate: false },
                SubmitOutcome::Posted { comment: b, duplicate: true },
            ) => assert_eq!(a.id, b.id),
            other => panic!("unexpected outcomes: {other:?}"),
        }
        assert_eq!(comments.count(Some(article.id)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_old_articles_are_closed() {
        let (articles, comments) = setup().await;
        let mut article = Article::new("Old news", None);
        article.pub_date -= Duration::days(30);
        articles.create(&article).await.unwrap();

        let settings = PolicySettings {
            autoclose_after: Some(25),
            ..Default::default()
        };
        let policy = article_policy(settings).build().unwrap();
        let binding = PolicyBinding::new(policy, Arc::new(comments), Arc::new(articles));

        let err = binding.submit(&submission("too late"), article.id).await.unwrap_err();
        assert!(matches!(err, CommentError::Forbidden(_)));
    }
}
