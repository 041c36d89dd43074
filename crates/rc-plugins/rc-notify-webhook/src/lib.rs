//! # rc-notify-webhook
//!
//! Delivers comment notifications as a JSON `POST` to a single endpoint. The
//! receiving service owns address lookup and delivery.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rc_core::traits::{NotificationContext, Notifier};
use reqwest::Client;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct Payload<'a> {
    recipients: &'a [Uuid],
    label: &'a str,
    context: &'a NotificationContext,
}

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(
        &self,
        recipients: Vec<Uuid>,
        label: String,
        context: NotificationContext,
    ) -> anyhow::Result<()> {
        let payload = Payload {
            recipients: &recipients,
            label: &label,
            context: &context,
        };
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("webhook {} refused notification", self.url))?;
        tracing::debug!(url = %self.url, count = recipients.len(), "notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rc_core::models::{Comment, CommentDraft};

    #[test]
    fn test_payload_shape() {
        let comment = Comment::from_draft(
            Uuid::now_v7(),
            CommentDraft {
                author_name: "Guest".into(),
                body: "hello".into(),
                ..Default::default()
            },
        );
        let owner = Uuid::now_v7();
        let context = NotificationContext {
            comment,
            verbose_name: "article".into(),
        };
        let payload = Payload {
            recipients: &[owner],
            label: "rusty_comments_comment",
            context: &context,
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["recipients"][0], owner.to_string());
        assert_eq!(json["label"], "rusty_comments_comment");
        assert_eq!(json["context"]["verbose_name"], "article");
        assert_eq!(json["context"]["comment"]["body"], "hello");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook").unwrap();
        let context = NotificationContext {
            comment: Comment::from_draft(Uuid::now_v7(), CommentDraft::default()),
            verbose_name: "article".into(),
        };
        let result = notifier
            .send(vec![Uuid::now_v7()], "label".into(), context)
            .await;
        assert!(result.is_err());
    }
}
