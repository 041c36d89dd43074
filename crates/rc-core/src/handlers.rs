//! # Handlers
//!
//! Coordinates the flow between an incoming request and the registered
//! configuration. Each handler resolves its configuration key, runs the
//! operation and folds access-denial and not-found failures into a
//! [`Response`] the host framework can render however it likes.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::configuration::{CommentPage, SubmitOutcome};
use crate::error::{CommentError, Result};
use crate::forms::{FieldErrors, FormSpec};
use crate::models::Comment;
use crate::registry::Registry;
use crate::request::CommentRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Form {
        form: FormSpec,
        errors: FieldErrors,
        values: HashMap<String, String>,
    },
    Preview { comment: Comment },
    /// Where the caller should send the client next.
    Redirect { location: String },
    Page(CommentPage),
    Posted { comment: Comment },
    Deleted { target_id: Uuid },
    Forbidden { reason: String },
    NotFound,
}

impl Response {
    fn from_error(err: CommentError) -> Result<Self> {
        match err {
            CommentError::NotRegistered(_) | CommentError::NotFound(..) => Ok(Self::NotFound),
            CommentError::Forbidden(reason) => Ok(Self::Forbidden { reason }),
            other => Err(other),
        }
    }
}

/// e.g. "/article/<target>/<comment>/posted/"
pub fn posted_url(key: &str, target_id: Uuid, comment_id: Uuid) -> String {
    format!("/{key}/{target_id}/{comment_id}/posted/")
}

pub fn deleted_url(key: &str, target_id: Uuid) -> String {
    format!("/{key}/{target_id}/deleted/")
}

/// Shows, validates, previews or stores a submission.
pub async fn create_comment(
    registry: &Registry,
    key: &str,
    target_id: Uuid,
    request: &CommentRequest,
) -> Result<Response> {
    let outcome = match registry.resolve(key) {
        Ok(registration) => registration.configuration.submit(request, target_id).await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(SubmitOutcome::Form { form, errors, values }) => Ok(Response::Form { form, errors, values }),
        Ok(SubmitOutcome::Preview { comment }) => Ok(Response::Preview { comment }),
        Ok(SubmitOutcome::Posted { comment, .. }) => Ok(Response::Redirect {
            location: posted_url(key, target_id, comment.id),
        }),
        Err(err) => Response::from_error(err),
    }
}

pub async fn delete_comment(
    registry: &Registry,
    key: &str,
    target_id: Uuid,
    comment_id: Uuid,
    request: &CommentRequest,
) -> Result<Response> {
    let outcome = match registry.resolve(key) {
        Ok(registration) => {
            registration
                .configuration
                .delete(&registration.record_type, request, target_id, comment_id)
                .await
        }
        Err(err) => Err(err),
    };

    match outcome {
        Ok(_) => Ok(Response::Redirect {
            location: deleted_url(key, target_id),
        }),
        Err(err) => Response::from_error(err),
    }
}

pub async fn comment_list(
    registry: &Registry,
    key: &str,
    target_id: Option<Uuid>,
    page: u32,
) -> Result<Response> {
    let outcome = match registry.resolve(key) {
        Ok(registration) => registration.configuration.list(target_id, page).await,
        Err(err) => Err(err),
    };
    outcome.map(Response::Page).or_else(Response::from_error)
}

pub async fn comment_posted(
    registry: &Registry,
    key: &str,
    target_id: Uuid,
    comment_id: Uuid,
) -> Result<Response> {
    let outcome = match registry.resolve(key) {
        Ok(registration) => registration.configuration.posted(target_id, comment_id).await,
        Err(err) => Err(err),
    };
    outcome
        .map(|comment| Response::Posted { comment })
        .or_else(Response::from_error)
}

pub async fn comment_deleted(registry: &Registry, key: &str, target_id: Uuid) -> Result<Response> {
    let outcome = match registry.resolve(key) {
        Ok(registration) => registration.configuration.deleted(target_id).await,
        Err(err) => Err(err),
    };
    outcome
        .map(|()| Response::Deleted { target_id })
        .or_else(Response::from_error)
}
