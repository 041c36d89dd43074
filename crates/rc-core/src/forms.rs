//! # Comment Form
//!
//! Field descriptions and validation for the content part of a submission.
//! Spam prevention fields are contributed separately by `spam::SpamCheck`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;
use url::Url;

use crate::models::{CommentDraft, AUTHOR_NAME_MAX_LENGTH, BODY_MAX_LENGTH};

/// Key used for errors that belong to the submission as a whole.
pub const NON_FIELD_ERRORS: &str = "__all__";

/// Never editable by the poster.
pub const ALWAYS_EXCLUDED: [&str; 5] = ["user", "user_username", "created_at", "ip_address", "target"];
/// Filled from the user's identity when posting requires authentication.
pub const AUTHOR_FIELDS: [&str; 3] = ["author_name", "author_email", "author_website"];

/// Field-level messages for re-display, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text { max_length: Option<usize> },
    TextArea { max_length: usize },
    Email,
    Url,
    Choice { choices: Vec<(String, String)> },
}

/// Enough about a field for a renderer to draw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub fn new(name: &str, label: &str, kind: FieldKind, required: bool) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            required,
        }
    }
}

/// Everything a renderer needs to show a submission form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormSpec {
    pub fields: Vec<FieldSpec>,
    /// Contributed by the active spam checks, in evaluation order
    pub spam_fields: Vec<FieldSpec>,
}

/// Validator for the editable comment fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentForm {
    exclude: Vec<&'static str>,
}

impl CommentForm {
    pub fn new(user_comments: bool) -> Self {
        let mut exclude = ALWAYS_EXCLUDED.to_vec();
        if user_comments {
            exclude.extend(AUTHOR_FIELDS);
        }
        Self { exclude }
    }

    pub fn exclude(&self) -> &[&'static str] {
        &self.exclude
    }

    pub fn includes(&self, field: &str) -> bool {
        !self.exclude.contains(&field)
    }

    pub fn fields(&self) -> Vec<FieldSpec> {
        let all = [
            FieldSpec::new(
                "author_name",
                "Name",
                FieldKind::Text { max_length: Some(AUTHOR_NAME_MAX_LENGTH) },
                true,
            ),
            FieldSpec::new("author_email", "Email", FieldKind::Email, true),
            FieldSpec::new("author_website", "Website", FieldKind::Url, false),
            FieldSpec::new("body", "Body", FieldKind::TextArea { max_length: BODY_MAX_LENGTH }, true),
        ];
        all.into_iter().filter(|f| self.includes(&f.name)).collect()
    }

    /// Cleans the submitted values. Excluded fields come back empty.
    pub fn validate(&self, fields: &HashMap<String, String>) -> Result<CommentDraft, FieldErrors> {
        let mut errors = FieldErrors::new();
        let value = |name: &str| fields.get(name).cloned().unwrap_or_default();
        let mut draft = CommentDraft::default();

        if self.includes("author_name") {
            draft.author_name = value("author_name");
            if draft.author_name.trim().is_empty() {
                errors.add("author_name", "This field is required.");
            } else if draft.author_name.chars().count() > AUTHOR_NAME_MAX_LENGTH {
                errors.add(
                    "author_name",
                    format!("Ensure this value has at most {AUTHOR_NAME_MAX_LENGTH} characters."),
                );
            }
        }

        if self.includes("author_email") {
            draft.author_email = value("author_email").trim().to_string();
            if draft.author_email.is_empty() {
                errors.add("author_email", "This field is required.");
            } else if !is_valid_email(&draft.author_email) {
                errors.add("author_email", "Enter a valid e-mail address.");
            }
        }

        if self.includes("author_website") {
            draft.author_website = value("author_website").trim().to_string();
            if !draft.author_website.is_empty() && !is_valid_url(&draft.author_website) {
                errors.add("author_website", "Enter a valid URL.");
            }
        }

        draft.body = value("body");
        if draft.body.trim().is_empty() {
            errors.add("body", "This field is required.");
        } else if draft.body.chars().count() > BODY_MAX_LENGTH {
            errors.add(
                "body",
                format!("Ensure this value has at most {BODY_MAX_LENGTH} characters."),
            );
        }

        if errors.is_empty() {
            Ok(draft)
        } else {
            Err(errors)
        }
    }
}

fn is_valid_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn is_valid_url(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn guest_form_requires_name_email_and_body() {
        let form = CommentForm::new(false);
        let errors = form.validate(&HashMap::new()).unwrap_err();
        assert!(errors.contains("author_name"));
        assert!(errors.contains("author_email"));
        assert!(errors.contains("body"));
        assert!(!errors.contains("author_website"));
    }

    #[test]
    fn user_form_only_asks_for_body() {
        let form = CommentForm::new(true);
        let names: Vec<_> = form.fields().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["body"]);
        assert!(form.exclude().contains(&"author_email"));

        let draft = form
            .validate(&submitted(&[("body", "hi"), ("author_name", "ignored")]))
            .unwrap();
        assert_eq!(draft.body, "hi");
        assert!(draft.author_name.is_empty());
    }

    #[test]
    fn rejects_malformed_email_and_website() {
        let form = CommentForm::new(false);
        let errors = form
            .validate(&submitted(&[
                ("author_name", "Ann"),
                ("author_email", "ann.example.com"),
                ("author_website", "ftp://example.com"),
                ("body", "hello"),
            ]))
            .unwrap_err();
        assert_eq!(errors.get("author_email"), ["Enter a valid e-mail address."]);
        assert_eq!(errors.get("author_website"), ["Enter a valid URL."]);
    }

    #[test]
    fn website_must_be_a_well_formed_http_url() {
        let form = CommentForm::new(false);
        let submit = |website: &str| {
            form.validate(&submitted(&[
                ("author_name", "Ann"),
                ("author_email", "ann@example.com"),
                ("author_website", website),
                ("body", "hello"),
            ]))
        };

        for website in ["http://:::", "http://exa<mple>.com", "https://[::1", "http://%%%"] {
            let errors = submit(website).unwrap_err();
            assert_eq!(errors.get("author_website"), ["Enter a valid URL."], "{website}");
        }

        let draft = submit("https://example.com/about?ref=blog").unwrap();
        assert_eq!(draft.author_website, "https://example.com/about?ref=blog");
        assert!(submit("http://[::1]:8080/").is_ok());
    }

    #[test]
    fn body_length_is_bounded() {
        let form = CommentForm::new(true);
        let long = "x".repeat(BODY_MAX_LENGTH + 1);
        let errors = form.validate(&submitted(&[("body", &long)])).unwrap_err();
        assert!(errors.contains("body"));

        let exact = "x".repeat(BODY_MAX_LENGTH);
        assert!(form.validate(&submitted(&[("body", &exact)])).is_ok());
    }

    #[test]
    fn errors_display_in_field_order() {
        let mut errors = FieldErrors::single("body", "required");
        errors.add("author_name", "too long");
        assert_eq!(errors.to_string(), "author_name: too long; body: required");
    }
}
