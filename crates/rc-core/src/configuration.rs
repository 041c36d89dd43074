//! # Comment Configuration
//!
//! Binds a [`CommentPolicy`] to the stores it works against and erases the
//! target type, so configurations for different targets can share one
//! registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::{CommentError, Result};
use crate::forms::{FieldErrors, FormSpec};
use crate::models::{Comment, RecordType};
use crate::policy::{CommentPolicy, PolicySettings};
use crate::request::{CommentRequest, Method};
use crate::traits::{CommentQuery, CommentRepo, NotificationContext, Notifier, Target, TargetRepo};

/// Event label passed to the notification channel.
pub const NOTIFICATION_LABEL: &str = "rusty_comments_comment";

/// Result of a submission that was not refused outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Blank form for a GET, or the submitted values with their errors.
    Form {
        form: FormSpec,
        errors: FieldErrors,
        values: HashMap<String, String>,
    },
    /// The comment as it would be stored. Nothing was written.
    Preview { comment: Comment },
    /// `duplicate` is set when an earlier identical comment was reused.
    Posted { comment: Comment, duplicate: bool },
}

/// One page of a comment listing. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentPage {
    pub comments: Vec<Comment>,
    pub page: u32,
    pub num_pages: u32,
    pub per_page: u32,
    pub total: u64,
}

impl CommentPage {
    pub fn has_next(&self) -> bool {
        self.page < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

/// Target-agnostic view of a bound policy, as stored in the registry.
#[async_trait]
pub trait CommentConfiguration: Send + Sync {
    fn settings(&self) -> &PolicySettings;

    fn form_spec(&self) -> FormSpec;

    async fn allow_comments(&self, target_id: Uuid) -> Result<bool>;

    /// Runs the submission workflow for `target_id`.
    async fn submit(&self, request: &CommentRequest, target_id: Uuid) -> Result<SubmitOutcome>;

    /// Deletes a comment after the permission check and returns it.
    async fn delete(
        &self,
        record_type: &RecordType,
        request: &CommentRequest,
        target_id: Uuid,
        comment_id: Uuid,
    ) -> Result<Comment>;

    /// Listing for one target, or across all targets when `None`.
    async fn list(&self, target_id: Option<Uuid>, page: u32) -> Result<CommentPage>;

    async fn posted(&self, target_id: Uuid, comment_id: Uuid) -> Result<Comment>;

    async fn deleted(&self, target_id: Uuid) -> Result<()>;

    /// Waits for notifications that are still being delivered.
    async fn drain_notifications(&self) {}
}

/// A policy together with its comment store, target store and notifier.
pub struct PolicyBinding<T> {
    policy: Arc<CommentPolicy<T>>,
    comments: Arc<dyn CommentRepo>,
    targets: Arc<dyn TargetRepo<T>>,
    notifier: Option<Arc<dyn Notifier>>,
    pending: Mutex<JoinSet<()>>,
}

impl<T: Target> PolicyBinding<T> {
    pub fn new(
        policy: CommentPolicy<T>,
        comments: Arc<dyn CommentRepo>,
        targets: Arc<dyn TargetRepo<T>>,
    ) -> Self {
        Self {
            policy: Arc::new(policy),
            comments,
            targets,
            notifier: None,
            pending: Mutex::new(JoinSet::new()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn policy(&self) -> &CommentPolicy<T> {
        &self.policy
    }

    async fn load_target(&self, target_id: Uuid) -> Result<T> {
        self.targets
            .get_target(target_id)
            .await?
            .ok_or_else(|| CommentError::not_found("target", target_id))
    }

    async fn load_comment(&self, target: &T, comment_id: Uuid) -> Result<Comment> {
        match self.comments.get(comment_id).await? {
            Some(comment) if comment.target_id == target.id() => Ok(comment),
            _ => Err(CommentError::not_found("comment", comment_id)),
        }
    }

    /// Dispatches on a background task tracked until
    /// [`CommentConfiguration::drain_notifications`]. Returns whether anything
    /// was sent.
    fn dispatch_notification(&self, target: &T, comment: &Comment) -> bool {
        if !self.policy.settings().send_notifications {
            return false;
        }
        let Some(notifier) = self.notifier.clone() else {
            return false;
        };
        let recipients = self.policy.notification_recipients(target);
        if recipients.is_empty() {
            return false;
        }

        let context = NotificationContext {
            comment: comment.clone(),
            verbose_name: target.verbose_name().to_string(),
        };
        let comment_id = comment.id;
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while pending.try_join_next().is_some() {}
        pending.spawn(async move {
            if let Err(err) = notifier
                .send(recipients, NOTIFICATION_LABEL.to_string(), context)
                .await
            {
                tracing::warn!(%comment_id, error = %err, "comment notification failed");
            }
        });
        true
    }
}

#[async_trait]
impl<T: Target> CommentConfiguration for PolicyBinding<T> {
    fn settings(&self) -> &PolicySettings {
        self.policy.settings()
    }

    fn form_spec(&self) -> FormSpec {
        self.policy.form_spec()
    }

    async fn allow_comments(&self, target_id: Uuid) -> Result<bool> {
        let target = self.load_target(target_id).await?;
        Ok(self.policy.allow_comments(&target))
    }

    async fn submit(&self, request: &CommentRequest, target_id: Uuid) -> Result<SubmitOutcome> {
        let target = self.load_target(target_id).await?;

        if !self.policy.allow_comments(&target) {
            return Err(CommentError::Forbidden("comments are closed".into()));
        }
        if !self.policy.allow_post_for(request.actor.as_ref()) {
            return Err(CommentError::Forbidden("authentication required".into()));
        }

        if request.method == Method::Get {
            return Ok(SubmitOutcome::Form {
                form: self.policy.form_spec(),
                errors: FieldErrors::new(),
                values: HashMap::new(),
            });
        }

        let mut errors = FieldErrors::new();
        let draft = match self.policy.form().validate(&request.fields) {
            Ok(draft) => Some(draft),
            Err(form_errors) => {
                errors.merge(form_errors);
                None
            }
        };
        for check in self.policy.spam_checks() {
            if draft.is_none() && check.is_remote() {
                continue;
            }
            errors.merge(check.validate(request).await?);
        }

        let draft = match draft {
            Some(draft) if errors.is_empty() => draft,
            _ => {
                tracing::debug!(%target_id, %errors, "comment submission rejected");
                return Ok(SubmitOutcome::Form {
                    form: self.policy.form_spec(),
                    errors,
                    values: request.fields.clone(),
                });
            }
        };

        let mut comment = Comment::from_draft(target.id(), draft);
        if let Some(actor) = &request.actor {
            comment.attach_user(actor);
        }
        comment.ip_address = request.remote_addr.clone();

        if request.is_preview() {
            tracing::debug!(%target_id, "comment previewed");
            return Ok(SubmitOutcome::Preview { comment });
        }

        let duplicate = if self.policy.settings().prevent_duplicates {
            self.policy
                .get_duplicate(self.comments.as_ref(), &target, &comment)
                .await?
        } else {
            None
        };

        let (comment, duplicate) = match duplicate {
            Some(existing) => {
                tracing::debug!(comment_id = %existing.id, %target_id, "duplicate submission merged");
                (existing, true)
            }
            None => {
                self.comments.insert(comment.clone()).await?;
                tracing::info!(comment_id = %comment.id, %target_id, "comment posted");
                (comment, false)
            }
        };

        self.dispatch_notification(&target, &comment);
        Ok(SubmitOutcome::Posted { comment, duplicate })
    }

    async fn delete(
        &self,
        record_type: &RecordType,
        request: &CommentRequest,
        target_id: Uuid,
        comment_id: Uuid,
    ) -> Result<Comment> {
        let target = self.load_target(target_id).await?;
        let comment = self.load_comment(&target, comment_id).await?;

        let permitted = self.policy.has_permission_to_delete(
            record_type,
            &comment,
            &target,
            request.actor.as_ref(),
            request.permissions.as_deref(),
        );
        if !permitted {
            return Err(CommentError::Forbidden("not allowed to delete this comment".into()));
        }

        self.comments.delete(comment.id).await?;
        tracing::info!(%comment_id, %target_id, "comment deleted");
        Ok(comment)
    }

    async fn list(&self, target_id: Option<Uuid>, page: u32) -> Result<CommentPage> {
        let per_page = self.policy.settings().paginate_by;
        let total = self.comments.count(target_id).await?;
        let num_pages = total.div_ceil(u64::from(per_page)).max(1);
        if page == 0 || u64::from(page) > num_pages {
            return Err(CommentError::not_found("page", page));
        }

        let comments = self
            .comments
            .list(CommentQuery {
                target_id,
                order: self.policy.settings().order_by,
                limit: per_page,
                offset: (page - 1) * per_page,
            })
            .await?;

        Ok(CommentPage {
            comments,
            page,
            num_pages: u32::try_from(num_pages).unwrap_or(u32::MAX),
            per_page,
            total,
        })
    }

    async fn posted(&self, target_id: Uuid, comment_id: Uuid) -> Result<Comment> {
        let target = self.load_target(target_id).await?;
        self.load_comment(&target, comment_id).await
    }

    async fn deleted(&self, target_id: Uuid) -> Result<()> {
        self.load_target(target_id).await.map(|_| ())
    }

    async fn drain_notifications(&self) {
        let mut pending = {
            let mut guard = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        while let Some(joined) = pending.join_next().await {
            if let Err(err) = joined {
                tracing::warn!(error = %err, "notification task did not finish");
            }
        }
    }
}
