//! # Comment Policy
//!
//! Per-target-type rules: whether comments are open, which fields posters
//! fill in, how duplicates are detected, who may delete, who gets notified.
//!
//! Plain data lives in [`PolicySettings`] so it can come from configuration
//! files. Everything that has to look at a concrete target type is supplied
//! as a hook through [`PolicyBuilder`].

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CommentError, Result};
use crate::forms::{CommentForm, FormSpec};
use crate::models::{Comment, RecordType, User};
use crate::spam::{ControlQuestion, ExternalClassifier, Honeypot, SpamCheck};
use crate::traits::{CommentRepo, PermissionChecker, SortOrder, SpamClassifier, Target};

pub const DEFAULT_PAGINATE_BY: u32 = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Requires a classifier hook.
    pub use_external_classifier: bool,
    pub use_control_question: bool,
    pub use_honeypot: bool,
    /// Only authenticated users may post; author fields come from the user.
    pub user_comments: bool,
    /// Authors and target owners may delete comments.
    pub user_can_delete: bool,
    /// Days after publication when new comments are rejected.
    pub autoclose_after: Option<u32>,
    pub prevent_duplicates: bool,
    pub send_notifications: bool,
    pub order_by: SortOrder,
    pub paginate_by: u32,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            use_external_classifier: false,
            use_control_question: false,
            use_honeypot: false,
            user_comments: false,
            user_can_delete: false,
            autoclose_after: None,
            prevent_duplicates: true,
            send_notifications: false,
            order_by: SortOrder::Oldest,
            paginate_by: DEFAULT_PAGINATE_BY,
        }
    }
}

type Accessor<T, R> = Arc<dyn Fn(&T) -> R + Send + Sync>;

/// Target-specific capabilities supplied at configuration time.
pub struct PolicyHooks<T> {
    pub comments_enabled: Option<Accessor<T, bool>>,
    pub published_at: Option<Accessor<T, DateTime<Utc>>>,
    pub target_owner: Option<Accessor<T, Option<Uuid>>>,
    /// Defaults to the target owner.
    pub notification_recipients: Option<Accessor<T, Vec<Uuid>>>,
    pub classifier: Option<Arc<dyn SpamClassifier>>,
    /// Run after the built-in checks.
    pub extra_spam_checks: Vec<Arc<dyn SpamCheck>>,
}

impl<T> Default for PolicyHooks<T> {
    fn default() -> Self {
        Self {
            comments_enabled: None,
            published_at: None,
            target_owner: None,
            notification_recipients: None,
            classifier: None,
            extra_spam_checks: Vec::new(),
        }
    }
}

impl<T> Clone for PolicyHooks<T> {
    fn clone(&self) -> Self {
        Self {
            comments_enabled: self.comments_enabled.clone(),
            published_at: self.published_at.clone(),
            target_owner: self.target_owner.clone(),
            notification_recipients: self.notification_recipients.clone(),
            classifier: self.classifier.clone(),
            extra_spam_checks: self.extra_spam_checks.clone(),
        }
    }
}

pub struct PolicyBuilder<T> {
    settings: PolicySettings,
    hooks: PolicyHooks<T>,
}

impl<T: Target> PolicyBuilder<T> {
    pub fn comments_enabled(mut self, f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.hooks.comments_enabled = Some(Arc::new(f));
        self
    }

    pub fn published_at(
        mut self,
        f: impl Fn(&T) -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.published_at = Some(Arc::new(f));
        self
    }

    pub fn target_owner(mut self, f: impl Fn(&T) -> Option<Uuid> + Send + Sync + 'static) -> Self {
        self.hooks.target_owner = Some(Arc::new(f));
        self
    }

    pub fn notification_recipients(
        mut self,
        f: impl Fn(&T) -> Vec<Uuid> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.notification_recipients = Some(Arc::new(f));
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn SpamClassifier>) -> Self {
        self.hooks.classifier = Some(classifier);
        self
    }

    pub fn spam_check(mut self, check: Arc<dyn SpamCheck>) -> Self {
        self.hooks.extra_spam_checks.push(check);
        self
    }

    pub fn build(self) -> Result<CommentPolicy<T>> {
        let Self { settings, hooks } = self;
        if settings.paginate_by == 0 {
            return Err(CommentError::Misconfigured("paginate_by must be positive".into()));
        }

        let mut spam_checks: Vec<Arc<dyn SpamCheck>> = Vec::new();
        if settings.use_external_classifier {
            let classifier = hooks.classifier.clone().ok_or_else(|| {
                CommentError::Misconfigured(
                    "use_external_classifier is set but no classifier was supplied".into(),
                )
            })?;
            spam_checks.push(Arc::new(ExternalClassifier::new(classifier)));
        }
        if settings.use_control_question {
            spam_checks.push(Arc::new(ControlQuestion));
        }
        if settings.use_honeypot {
            spam_checks.push(Arc::new(Honeypot));
        }
        spam_checks.extend(hooks.extra_spam_checks.iter().cloned());

        Ok(CommentPolicy {
            form: CommentForm::new(settings.user_comments),
            settings,
            hooks,
            spam_checks,
        })
    }
}

/// Immutable rule set for one comment record type.
pub struct CommentPolicy<T> {
    settings: PolicySettings,
    hooks: PolicyHooks<T>,
    spam_checks: Vec<Arc<dyn SpamCheck>>,
    form: CommentForm,
}

impl<T: Target> CommentPolicy<T> {
    pub fn builder(settings: PolicySettings) -> PolicyBuilder<T> {
        PolicyBuilder {
            settings,
            hooks: PolicyHooks::default(),
        }
    }

    pub fn settings(&self) -> &PolicySettings {
        &self.settings
    }

    pub fn form(&self) -> &CommentForm {
        &self.form
    }

    pub fn spam_checks(&self) -> &[Arc<dyn SpamCheck>] {
        &self.spam_checks
    }

    pub fn form_spec(&self) -> FormSpec {
        FormSpec {
            fields: self.form.fields(),
            spam_fields: self.spam_checks.iter().flat_map(|c| c.fields()).collect(),
        }
    }

    /// Whether `actor` may see and use the submission form at all.
    pub fn allow_post_for(&self, actor: Option<&User>) -> bool {
        !self.settings.user_comments || actor.is_some()
    }

    /// Whole calendar days between publication and `today`, if tracked.
    pub fn days_since_published(&self, target: &T, today: NaiveDate) -> Option<i64> {
        let published_at = self.hooks.published_at.as_ref()?;
        Some((today - published_at(target).date_naive()).num_days())
    }

    pub fn allow_comments(&self, target: &T) -> bool {
        self.allow_comments_on(target, Utc::now().date_naive())
    }

    pub fn allow_comments_on(&self, target: &T, today: NaiveDate) -> bool {
        if let Some(enabled) = &self.hooks.comments_enabled {
            if !enabled(target) {
                return false;
            }
        }
        match (self.settings.autoclose_after, self.days_since_published(target, today)) {
            (Some(window), Some(days)) => days < i64::from(window),
            _ => true,
        }
    }

    pub fn target_owner(&self, target: &T) -> Option<Uuid> {
        self.hooks.target_owner.as_ref().and_then(|owner| owner(target))
    }

    /// Finds an earlier comment with the same author, body and calendar day.
    ///
    /// Only the most recent identical comment is considered, so a message
    /// repeated on a later day is never treated as a duplicate.
    pub async fn get_duplicate(
        &self,
        repo: &dyn CommentRepo,
        target: &T,
        candidate: &Comment,
    ) -> anyhow::Result<Option<Comment>> {
        let latest = repo
            .latest_matching(target.id(), candidate.identity(), candidate.body.clone())
            .await?;
        Ok(latest.filter(|existing| {
            existing.created_on() == candidate.created_on() && existing.body == candidate.body
        }))
    }

    /// Any one of: self-deletion by author or target owner, or the
    /// record type's delete permission via `checker`.
    pub fn has_permission_to_delete(
        &self,
        record_type: &RecordType,
        comment: &Comment,
        target: &T,
        actor: Option<&User>,
        checker: Option<&dyn PermissionChecker>,
    ) -> bool {
        let Some(actor) = actor else {
            return false;
        };

        if self.settings.user_can_delete
            && (comment.is_authored_by(actor) || self.target_owner(target) == Some(actor.id))
        {
            return true;
        }

        checker.is_some_and(|c| c.has_perm(actor, &record_type.delete_permission()))
    }

    pub fn notification_recipients(&self, target: &T) -> Vec<Uuid> {
        match &self.hooks.notification_recipients {
            Some(recipients) => recipients(target),
            None => self.target_owner(target).into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockPermissionChecker;
    use chrono::{Duration, TimeZone};

    #[derive(Clone)]
    struct Article {
        id: Uuid,
        owner: Option<Uuid>,
        allow_comments: bool,
        pub_date: DateTime<Utc>,
    }

    impl Target for Article {
        fn id(&self) -> Uuid {
            self.id
        }
    }

    fn article(days_old: i64, allow_comments: bool) -> Article {
        Article {
            id: Uuid::now_v7(),
            owner: None,
            allow_comments,
            pub_date: Utc::now() - Duration::days(days_old),
        }
    }

    fn gated(settings: PolicySettings) -> CommentPolicy<Article> {
        CommentPolicy::builder(settings)
            .comments_enabled(|a: &Article| a.allow_comments)
            .published_at(|a: &Article| a.pub_date)
            .target_owner(|a: &Article| a.owner)
            .build()
            .unwrap()
    }

    fn window(days: u32) -> PolicySettings {
        PolicySettings {
            autoclose_after: Some(days),
            ..Default::default()
        }
    }

    #[test]
    fn disabled_target_is_closed_regardless_of_window() {
        let policy = gated(window(25));
        assert!(!policy.allow_comments(&article(0, false)));
        let no_window = gated(PolicySettings::default());
        assert!(!no_window.allow_comments(&article(0, false)));
    }

    #[test]
    fn window_boundary() {
        let policy = gated(window(25));
        assert!(policy.allow_comments(&article(0, true)));
        assert!(policy.allow_comments(&article(24, true)));
        assert!(!policy.allow_comments(&article(25, true)));
        assert!(!policy.allow_comments(&article(30, true)));
    }

    #[test]
    fn compares_calendar_dates_not_timestamps() {
        let policy = gated(window(1));
        let mut late_yesterday = article(0, true);
        late_yesterday.pub_date = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(policy.days_since_published(&late_yesterday, today), Some(1));
        assert!(!policy.allow_comments_on(&late_yesterday, today));

        let mut early_today = late_yesterday.clone();
        early_today.pub_date = Utc.with_ymd_and_hms(2024, 3, 10, 0, 1, 0).unwrap();
        assert!(policy.allow_comments_on(&early_today, today));
    }

    #[test]
    fn no_gates_means_open() {
        let policy: CommentPolicy<Article> = CommentPolicy::builder(window(1)).build().unwrap();
        assert!(policy.allow_comments(&article(400, false)));
    }

    #[test]
    fn classifier_flag_without_classifier_is_rejected() {
        let settings = PolicySettings {
            use_external_classifier: true,
            ..Default::default()
        };
        let result = CommentPolicy::<Article>::builder(settings).build();
        assert!(matches!(result, Err(CommentError::Misconfigured(_))));
    }

    #[test]
    fn spam_checks_follow_settings() {
        let settings = PolicySettings {
            use_control_question: true,
            use_honeypot: true,
            ..Default::default()
        };
        let policy = gated(settings);
        let names: Vec<_> = policy.spam_checks().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["control_question", "honeypot"]);
        let spec = policy.form_spec();
        assert_eq!(spec.spam_fields.len(), 2);
    }

    fn comment_by(user: Option<&User>, target: &Article) -> Comment {
        let mut comment = Comment::from_draft(target.id, Default::default());
        if let Some(user) = user {
            comment.attach_user(user);
        }
        comment
    }

    #[test]
    fn anonymous_never_deletes() {
        let record = RecordType::new("articles", "articlecomment");
        let policy = gated(PolicySettings {
            user_can_delete: true,
            ..Default::default()
        });
        let target = article(0, true);
        let comment = comment_by(None, &target);

        let mut checker = MockPermissionChecker::new();
        checker.expect_has_perm().never();
        assert!(!policy.has_permission_to_delete(&record, &comment, &target, None, Some(&checker)));
    }

    #[test]
    fn author_and_owner_delete_only_when_enabled() {
        let record = RecordType::new("articles", "articlecomment");
        let author = User::new("author", "a@example.com");
        let owner = User::new("owner", "o@example.com");
        let stranger = User::new("stranger", "s@example.com");
        let mut target = article(0, true);
        target.owner = Some(owner.id);
        let comment = comment_by(Some(&author), &target);

        let open = gated(PolicySettings {
            user_can_delete: true,
            ..Default::default()
        });
        assert!(open.has_permission_to_delete(&record, &comment, &target, Some(&author), None));
        assert!(open.has_permission_to_delete(&record, &comment, &target, Some(&owner), None));
        assert!(!open.has_permission_to_delete(&record, &comment, &target, Some(&stranger), None));

        let closed = gated(PolicySettings::default());
        assert!(!closed.has_permission_to_delete(&record, &comment, &target, Some(&author), None));
    }

    #[test]
    fn delete_permission_grants_staff() {
        let record = RecordType::new("articles", "articlecomment");
        let staff = User::new("staff", "staff@example.com");
        let target = article(0, true);
        let comment = comment_by(None, &target);
        let policy = gated(PolicySettings::default());

        let mut checker = MockPermissionChecker::new();
        checker
            .expect_has_perm()
            .withf(|_, perm| perm.to_string() == "articles.delete_articlecomment")
            .times(1)
            .returning(|_, _| true);
        assert!(policy.has_permission_to_delete(&record, &comment, &target, Some(&staff), Some(&checker)));
    }

    #[test]
    fn recipients_default_to_owner() {
        let policy = gated(PolicySettings::default());
        let mut target = article(0, true);
        assert!(policy.notification_recipients(&target).is_empty());
        let owner = Uuid::now_v7();
        target.owner = Some(owner);
        assert_eq!(policy.notification_recipients(&target), vec![owner]);
    }

    #[test]
    fn allow_post_for_requires_actor_only_for_user_comments() {
        let guest_policy = gated(PolicySettings::default());
        assert!(guest_policy.allow_post_for(None));
        let user_policy = gated(PolicySettings {
            user_comments: true,
            ..Default::default()
        });
        assert!(!user_policy.allow_post_for(None));
        assert!(user_policy.allow_post_for(Some(&User::new("u", "u@example.com"))));
    }
}
