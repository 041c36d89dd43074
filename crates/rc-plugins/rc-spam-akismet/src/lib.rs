//! # rc-spam-akismet
//!
//! [`SpamClassifier`] backed by the Akismet REST API. The key is verified once
//! per client; comments are only sent for checking after it has been
//! accepted. The key travels in the form body, and request errors are
//! stripped of their URL before they leave this crate.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rc_core::traits::{ClassifierInput, SpamClassifier};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::OnceCell;

const DEFAULT_ENDPOINT: &str = "https://rest.akismet.com/1.1";

pub struct AkismetClient {
    client: Client,
    api_key: SecretString,
    blog_url: String,
    endpoint: String,
    key_verified: OnceCell<bool>,
}

impl AkismetClient {
    pub fn new(api_key: SecretString, blog_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("rusty-comments/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            blog_url: blog_url.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            key_verified: OnceCell::new(),
        })
    }

    /// Points the client at another API root, e.g. a local stand-in.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.endpoint)
    }

    /// Form body for `comment-check`.
    fn check_params(&self, input: &ClassifierInput) -> Vec<(&'static str, String)> {
        vec![
            ("api_key", self.api_key.expose_secret().to_string()),
            ("blog", self.blog_url.clone()),
            ("user_ip", input.user_ip.clone()),
            ("user_agent", input.user_agent.clone()),
            ("referrer", input.referrer.clone()),
            ("comment_type", "comment".to_string()),
            ("comment_content", input.body.clone()),
            ("comment_author", input.author_name.clone()),
            ("comment_author_email", input.author_email.clone()),
            ("comment_author_url", input.author_website.clone()),
        ]
    }

    /// Asks Akismet whether the key is valid for the blog. Cached after the
    /// first answer.
    pub async fn verify_key(&self) -> anyhow::Result<bool> {
        self.key_verified
            .get_or_try_init(|| async {
                let body = self
                    .client
                    .post(self.url("verify-key"))
                    .form(&[
                        ("key", self.api_key.expose_secret()),
                        ("blog", self.blog_url.as_str()),
                    ])
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(reqwest::Error::without_url)?
                    .text()
                    .await
                    .map_err(reqwest::Error::without_url)?;
                let valid = parse_verify_response(&body);
                if !valid {
                    tracing::warn!(blog = %self.blog_url, "akismet rejected the api key");
                }
                Ok::<_, anyhow::Error>(valid)
            })
            .await
            .copied()
    }
}

fn parse_verify_response(body: &str) -> bool {
    body.trim() == "valid"
}

fn parse_check_response(body: &str) -> anyhow::Result<bool> {
    match body.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => anyhow::bail!("unexpected akismet response: {other:?}"),
    }
}

#[async_trait]
impl SpamClassifier for AkismetClient {
    async fn is_spam(&self, input: ClassifierInput) -> anyhow::Result<bool> {
        if !self.verify_key().await? {
            // An unusable key lets everything through.
            return Ok(false);
        }

        let body = self
            .client
            .post(self.url("comment-check"))
            .form(&self.check_params(&input))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(reqwest::Error::without_url)?
            .text()
            .await
            .map_err(reqwest::Error::without_url)?;
        let spam = parse_check_response(&body)?;
        tracing::debug!(spam, "akismet comment-check");
        Ok(spam)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AkismetClient {
        AkismetClient::new(SecretString::from("abc123".to_string()), "https://blog.example.com/").unwrap()
    }

    #[test]
    fn test_urls_keep_key_out() {
        let client = client();
        assert_eq!(client.url("comment-check"), "https://rest.akismet.com/1.1/comment-check");
        assert_eq!(client.url("verify-key"), "https://rest.akismet.com/1.1/verify-key");

        let local = client.with_endpoint("http://127.0.0.1:9/1.1/");
        assert_eq!(local.url("verify-key"), "http://127.0.0.1:9/1.1/verify-key");
    }

    #[test]
    fn test_check_params() {
        let input = ClassifierInput {
            body: "buy now".into(),
            author_name: "Spammer".into(),
            author_email: "spam@example.com".into(),
            user_ip: "10.0.0.1".into(),
            ..Default::default()
        };
        let params = client().check_params(&input);
        let get = |name: &str| {
            params
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.as_str())
        };
        assert_eq!(get("api_key"), Some("abc123"));
        assert_eq!(get("blog"), Some("https://blog.example.com/"));
        assert_eq!(get("comment_type"), Some("comment"));
        assert_eq!(get("comment_content"), Some("buy now"));
        assert_eq!(get("comment_author_email"), Some("spam@example.com"));
        assert_eq!(get("user_ip"), Some("10.0.0.1"));
        assert_eq!(get("comment_author_url"), Some(""));
    }

    #[test]
    fn test_response_parsing() {
        assert!(parse_verify_response("valid"));
        assert!(!parse_verify_response("invalid"));
        assert!(parse_check_response("true\n").unwrap());
        assert!(!parse_check_response("false").unwrap());
        assert!(parse_check_response("Missing required field").is_err());
    }

    #[tokio::test]
    async fn test_cached_rejection_skips_check() {
        let client = client();
        client.key_verified.set(false).unwrap();
        let spam = client.is_spam(ClassifierInput::default()).await.unwrap();
        assert!(!spam);
    }

    #[tokio::test]
    async fn test_transport_error_hides_key() {
        let client = AkismetClient::new(
            SecretString::from("supersecretkey".to_string()),
            "https://blog.example.com/",
        )
        .unwrap()
        .with_endpoint("http://127.0.0.1:9/1.1");
        client.key_verified.set(true).unwrap();

        let err = client.is_spam(ClassifierInput::default()).await.unwrap_err();
        let rendered = format!("{err:#} {err:?}");
        assert!(!rendered.contains("supersecretkey"), "{rendered}");
    }
}
