//! # Domain Models
//!
//! These structs represent the core entities of rusty-comments.
//! We use UUID v7 for time-ordered, globally unique identification.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on the comment body, in characters.
pub const BODY_MAX_LENGTH: usize = 3000;
/// Room for "first last" with two 30 character name parts.
pub const AUTHOR_NAME_MAX_LENGTH: usize = 61;
pub const USERNAME_MAX_LENGTH: usize = 30;

/// An authenticated identity supplied by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            username: username.into(),
            first_name: String::new(),
            last_name: String::new(),
            email: email.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Full name when either part is set, otherwise the username.
    pub fn display_name(&self) -> String {
        if self.first_name.is_empty() && self.last_name.is_empty() {
            self.username.clone()
        } else {
            self.full_name()
        }
    }
}

/// Cleaned output of the comment form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDraft {
    pub author_name: String,
    pub author_email: String,
    pub author_website: String,
    pub body: String,
}

/// A comment attached to exactly one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub target_id: Uuid,
    pub user_id: Option<Uuid>,
    /// Denormalized so listings never need to resolve the user
    pub user_username: String,
    pub author_name: String,
    pub author_email: String,
    pub author_website: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub ip_address: Option<String>, // IPv4 or IPv6, as reported by the host
}

impl Comment {
    /// Builds an unsaved comment from validated form data.
    pub fn from_draft(target_id: Uuid, draft: CommentDraft) -> Self {
        Self {
            id: Uuid::now_v7(),
            target_id,
            user_id: None,
            user_username: String::new(),
            author_name: draft.author_name,
            author_email: draft.author_email,
            author_website: draft.author_website,
            body: draft.body,
            created_at: Utc::now(),
            ip_address: None,
        }
    }

    /// Attaches `user` as the author and copies its identity onto the comment.
    pub fn attach_user(&mut self, user: &User) {
        self.user_id = Some(user.id);
        self.denormalize_user(user);
    }

    /// User data always wins over whatever was typed into the author fields.
    pub fn denormalize_user(&mut self, user: &User) {
        self.author_name = user.display_name();
        self.author_email = user.email.clone();
        self.user_username = user.username.chars().take(USERNAME_MAX_LENGTH).collect();
    }

    pub fn identity(&self) -> AuthorIdentity {
        AuthorIdentity {
            user_id: self.user_id,
            author_name: self.author_name.clone(),
            author_email: self.author_email.clone(),
            author_website: self.author_website.clone(),
        }
    }

    pub fn created_on(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    pub fn is_authored_by(&self, user: &User) -> bool {
        self.user_id == Some(user.id)
    }
}

/// The fields that together identify who wrote a comment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorIdentity {
    pub user_id: Option<Uuid>,
    pub author_name: String,
    pub author_email: String,
    pub author_website: String,
}

/// Names the comment record type a configuration is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordType {
    pub app_label: String,
    pub model_name: String,
}

impl RecordType {
    pub fn new(app_label: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            app_label: app_label.into(),
            model_name: model_name.into(),
        }
    }

    /// e.g. "articles.delete_articlecomment"
    pub fn delete_permission(&self) -> String {
        format!("{}.delete_{}", self.app_label, self.model_name)
    }
}
