//! # Spam Prevention
//!
//! Independently pluggable checks run next to the comment form. A submission
//! is only valid when the form and every active check pass.

use std::sync::Arc;

use async_trait::async_trait;

use crate::forms::{FieldErrors, FieldKind, FieldSpec, NON_FIELD_ERRORS};
use crate::request::CommentRequest;
use crate::traits::{ClassifierInput, SpamClassifier};

/// A single spam prevention mechanism.
#[async_trait]
pub trait SpamCheck: Send + Sync {
    fn name(&self) -> &str;

    /// Extra fields this check adds to the form, if any.
    fn fields(&self) -> Vec<FieldSpec>;

    /// Remote checks are skipped while the content form has errors.
    fn is_remote(&self) -> bool {
        false
    }

    /// Returns the rejections for this submission, empty when it passes.
    /// `Err` is reserved for failures of the check itself.
    async fn validate(&self, request: &CommentRequest) -> anyhow::Result<FieldErrors>;
}

/// A question trivial for humans and annoying for bots.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlQuestion;

impl ControlQuestion {
    pub const FIELD: &'static str = "question";
    pub const LABEL: &'static str = "How many ears does an average human have?";
    pub const CORRECT_ANSWER: u8 = 1;

    fn choices() -> Vec<(String, String)> {
        vec![("0".into(), "One".into()), ("1".into(), "Two".into())]
    }
}

#[async_trait]
impl SpamCheck for ControlQuestion {
    fn name(&self) -> &str {
        "control_question"
    }

    fn fields(&self) -> Vec<FieldSpec> {
        vec![FieldSpec::new(
            Self::FIELD,
            Self::LABEL,
            FieldKind::Choice { choices: Self::choices() },
            true,
        )]
    }

    async fn validate(&self, request: &CommentRequest) -> anyhow::Result<FieldErrors> {
        let answer = request.field(Self::FIELD).map(str::trim).unwrap_or_default();
        if answer.is_empty() {
            return Ok(FieldErrors::single(Self::FIELD, "This field is required."));
        }
        let errors = match answer.parse::<u8>() {
            Ok(Self::CORRECT_ANSWER) => FieldErrors::new(),
            Ok(0) => FieldErrors::single(Self::FIELD, "Think again!"),
            _ => FieldErrors::single(
                Self::FIELD,
                format!("Select a valid choice. {answer} is not one of the available choices."),
            ),
        };
        Ok(errors)
    }
}

/// A field that humans never see and bots happily fill in.
#[derive(Debug, Clone, Copy, Default)]
pub struct Honeypot;

impl Honeypot {
    pub const FIELD: &'static str = "honeypot";
}

#[async_trait]
impl SpamCheck for Honeypot {
    fn name(&self) -> &str {
        "honeypot"
    }

    fn fields(&self) -> Vec<FieldSpec> {
        vec![FieldSpec::new(
            Self::FIELD,
            "Leave this field empty",
            FieldKind::Text { max_length: None },
            false,
        )]
    }

    async fn validate(&self, request: &CommentRequest) -> anyhow::Result<FieldErrors> {
        match request.field(Self::FIELD) {
            Some(value) if !value.is_empty() => {
                Ok(FieldErrors::single(Self::FIELD, "This field must remain empty."))
            }
            _ => Ok(FieldErrors::new()),
        }
    }
}

/// Hands the submission to an external classification service.
#[derive(Clone)]
pub struct ExternalClassifier {
    classifier: Arc<dyn SpamClassifier>,
}

impl ExternalClassifier {
    pub fn new(classifier: Arc<dyn SpamClassifier>) -> Self {
        Self { classifier }
    }

    fn input(request: &CommentRequest) -> ClassifierInput {
        let field = |name: &str| request.field(name).unwrap_or_default().to_string();
        let (author_name, author_email) = match &request.actor {
            Some(user) => (user.display_name(), user.email.clone()),
            None => (field("author_name"), field("author_email")),
        };
        ClassifierInput {
            body: field("body"),
            author_name,
            author_email,
            author_website: field("author_website"),
            user_ip: request.remote_addr.clone().unwrap_or_default(),
            user_agent: request.user_agent.clone().unwrap_or_default(),
            referrer: request.referrer.clone().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl SpamCheck for ExternalClassifier {
    fn name(&self) -> &str {
        "external_classifier"
    }

    fn is_remote(&self) -> bool {
        true
    }

    fn fields(&self) -> Vec<FieldSpec> {
        Vec::new()
    }

    async fn validate(&self, request: &CommentRequest) -> anyhow::Result<FieldErrors> {
        if self.classifier.is_spam(Self::input(request)).await? {
            tracing::info!(remote_addr = ?request.remote_addr, "classifier flagged comment as spam");
            return Ok(FieldErrors::single(NON_FIELD_ERRORS, "Your comment appears to be spam."));
        }
        Ok(FieldErrors::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::traits::MockSpamClassifier;

    #[tokio::test]
    async fn control_question_accepts_only_two() {
        let check = ControlQuestion;
        let ok = check.validate(&CommentRequest::post([("question", "1")])).await.unwrap();
        assert!(ok.is_empty());

        let wrong = check.validate(&CommentRequest::post([("question", "0")])).await.unwrap();
        assert_eq!(wrong.get("question"), ["Think again!"]);

        let missing = check.validate(&CommentRequest::post([("body", "x")])).await.unwrap();
        assert_eq!(missing.get("question"), ["This field is required."]);

        let bogus = check.validate(&CommentRequest::post([("question", "7")])).await.unwrap();
        assert!(bogus.contains("question"));
    }

    #[tokio::test]
    async fn honeypot_must_stay_empty() {
        let check = Honeypot;
        assert!(check.validate(&CommentRequest::post([("honeypot", "")])).await.unwrap().is_empty());
        assert!(check.validate(&CommentRequest::post([("body", "x")])).await.unwrap().is_empty());
        let caught = check.validate(&CommentRequest::post([("honeypot", "buy now")])).await.unwrap();
        assert_eq!(caught.get("honeypot"), ["This field must remain empty."]);
    }

    #[tokio::test]
    async fn classifier_sees_actor_identity_and_body() {
        let mut classifier = MockSpamClassifier::new();
        classifier
            .expect_is_spam()
            .withf(|input| {
                input.body == "cheap pills"
                    && input.author_email == "x@x.com"
                    && input.user_ip == "10.0.0.1"
            })
            .times(1)
            .returning(|_| Ok(true));

        let check = ExternalClassifier::new(Arc::new(classifier));
        let request = CommentRequest::post([("body", "cheap pills")])
            .with_actor(User::new("username", "x@x.com"))
            .with_remote_addr("10.0.0.1");
        let errors = check.validate(&request).await.unwrap();
        assert!(errors.contains(NON_FIELD_ERRORS));
    }

    #[tokio::test]
    async fn classifier_failure_propagates() {
        let mut classifier = MockSpamClassifier::new();
        classifier
            .expect_is_spam()
            .returning(|_| Err(anyhow::anyhow!("service unavailable")));
        let check = ExternalClassifier::new(Arc::new(classifier));
        assert!(check.validate(&CommentRequest::post([("body", "x")])).await.is_err());
    }
}
