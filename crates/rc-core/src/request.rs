//! The slice of an HTTP request the comment workflow needs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::models::User;
use crate::traits::PermissionChecker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Clone)]
pub struct CommentRequest {
    pub method: Method,
    /// Submitted form values, keyed by field name
    pub fields: HashMap<String, String>,
    /// `None` is the anonymous actor
    pub actor: Option<User>,
    pub permissions: Option<Arc<dyn PermissionChecker>>,
    pub remote_addr: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

impl CommentRequest {
    pub fn get() -> Self {
        Self {
            method: Method::Get,
            fields: HashMap::new(),
            actor: None,
            permissions: None,
            remote_addr: None,
            referrer: None,
            user_agent: None,
        }
    }

    pub fn post<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            method: Method::Post,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Self::get()
        }
    }

    pub fn with_actor(mut self, actor: User) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_permissions(mut self, checker: Arc<dyn PermissionChecker>) -> Self {
        self.permissions = Some(checker);
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// A "submit" button labelled preview, or any "preview" field at all.
    pub fn is_preview(&self) -> bool {
        self.field("submit")
            .is_some_and(|v| v.eq_ignore_ascii_case("preview"))
            || self.fields.contains_key("preview")
    }
}

impl fmt::Debug for CommentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommentRequest")
            .field("method", &self.method)
            .field("fields", &self.fields)
            .field("actor", &self.actor.as_ref().map(|u| &u.username))
            .field("permissions", &self.permissions.is_some())
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_detection() {
        assert!(CommentRequest::post([("submit", "Preview")]).is_preview());
        assert!(CommentRequest::post([("preview", "")]).is_preview());
        assert!(!CommentRequest::post([("submit", "Post")]).is_preview());
        assert!(!CommentRequest::get().is_preview());
    }
}
