//! # rc-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `rc-core` domain models.

pub mod article;

use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rc_core::models::{AuthorIdentity, Comment};
use rc_core::traits::{CommentQuery, CommentRepo, SortOrder};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

pub use article::{article_policy, Article, SqliteArticleRepo};
pub use sqlx::sqlite::SqlitePool;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS articles (
        id             BLOB PRIMARY KEY,
        title          TEXT NOT NULL,
        owner_id       BLOB,
        allow_comments INTEGER NOT NULL DEFAULT 0,
        pub_date       INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS comments (
        id             BLOB PRIMARY KEY,
        kind           TEXT NOT NULL,
        target_id      BLOB NOT NULL,
        user_id        BLOB,
        user_username  TEXT NOT NULL DEFAULT '',
        author_name    TEXT NOT NULL,
        author_email   TEXT NOT NULL,
        author_website TEXT NOT NULL DEFAULT '',
        body           TEXT NOT NULL,
        created_at     INTEGER NOT NULL,
        ip_address     TEXT
    )",
    "CREATE INDEX IF NOT EXISTS comments_kind_target_created
        ON comments (kind, target_id, created_at)",
];

/// Opens a pool for `url` and makes sure the tables exist.
///
/// In-memory databases live and die with their connection, so those pools
/// are pinned to a single connection that is never recycled.
pub async fn connect(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid sqlite url {url}"))?
        .create_if_missing(true);

    let pool_options = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options.connect_with(options).await?;
    migrate(&pool).await?;
    tracing::info!(%url, "sqlite store ready");
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

// Helpers for UUID and timestamp conversion
pub(crate) fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

pub(crate) fn blob_to_uuid(blob: &[u8]) -> anyhow::Result<Uuid> {
    Ok(Uuid::from_slice(blob)?)
}

pub(crate) fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> anyhow::Result<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos).context("timestamp out of range")
}

/// Comments of one record type, stored in the shared `comments` table.
#[derive(Debug, Clone)]
pub struct SqliteCommentRepo {
    pool: SqlitePool,
    kind: String,
}

impl SqliteCommentRepo {
    /// `kind` scopes every query, usually the record type's model name.
    pub fn new(pool: SqlitePool, kind: impl Into<String>) -> Self {
        Self {
            pool,
            kind: kind.into(),
        }
    }

    fn map_row(row: &SqliteRow) -> anyhow::Result<Comment> {
        let user_id = row
            .try_get::<Option<Vec<u8>>, _>("user_id")?
            .map(|blob| blob_to_uuid(&blob))
            .transpose()?;
        Ok(Comment {
            id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("id")?)?,
            target_id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("target_id")?)?,
            user_id,
            user_username: row.try_get("user_username")?,
            author_name: row.try_get("author_name")?,
            author_email: row.try_get("author_email")?,
            author_website: row.try_get("author_website")?,
            body: row.try_get("body")?,
            created_at: from_micros(row.try_get("created_at")?)?,
            ip_address: row.try_get("ip_address")?,
        })
    }
}

#[async_trait]
impl CommentRepo for SqliteCommentRepo {
    async fn insert(&self, comment: Comment) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO comments (id, kind, target_id, user_id, user_username, author_name,
                author_email, author_website, body, created_at, ip_address)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(comment.id))
        .bind(&self.kind)
        .bind(uuid_to_blob(comment.target_id))
        .bind(comment.user_id.map(uuid_to_blob))
        .bind(comment.user_username)
        .bind(comment.author_name)
        .bind(comment.author_email)
        .bind(comment.author_website)
        .bind(comment.body)
        .bind(to_micros(comment.created_at))
        .bind(comment.ip_address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Comment>> {
        let row = sqlx::query("SELECT * FROM comments WHERE kind = ? AND id = ?")
            .bind(&self.kind)
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE kind = ? AND id = ?")
            .bind(&self.kind)
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `IS` rather than `=` so a missing user matches a missing user.
    async fn latest_matching(
        &self,
        target_id: Uuid,
        identity: AuthorIdentity,
        body: String,
    ) -> anyhow::Result<Option<Comment>> {
        let row = sqlx::query(
            "SELECT * FROM comments
             WHERE kind = ? AND target_id = ? AND user_id IS ?
               AND author_name = ? AND author_email = ? AND author_website = ?
               AND body = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(&self.kind)
        .bind(uuid_to_blob(target_id))
        .bind(identity.user_id.map(uuid_to_blob))
        .bind(identity.author_name)
        .bind(identity.author_email)
        .bind(identity.author_website)
        .bind(body)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::map_row).transpose()
    }

    async fn list(&self, query: CommentQuery) -> anyhow::Result<Vec<Comment>> {
        let order = match query.order {
            SortOrder::Oldest => "ASC",
            SortOrder::Newest => "DESC",
        };
        let sql = format!(
            "SELECT * FROM comments
             WHERE kind = ? AND (? IS NULL OR target_id = ?)
             ORDER BY created_at {order}, id {order}
             LIMIT ? OFFSET ?"
        );
        let target = query.target_id.map(uuid_to_blob);
        sqlx::query(&sql)
            .bind(&self.kind)
            .bind(target.clone())
            .bind(target)
            .bind(i64::from(query.limit))
            .bind(i64::from(query.offset))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(Self::map_row)
            .collect()
    }

    async fn count(&self, target_id: Option<Uuid>) -> anyhow::Result<u64> {
        let target = target_id.map(uuid_to_blob);
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments WHERE kind = ? AND (? IS NULL OR target_id = ?)",
        )
        .bind(&self.kind)
        .bind(target.clone())
        .bind(target)
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(count)?)
    }
}
