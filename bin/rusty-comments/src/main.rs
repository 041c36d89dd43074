//! # Rusty-Comments Binary
//!
//! Assembles the comment registry from settings and compile-time features,
//! then runs a single CLI command against it.

mod cli;

use std::sync::Arc;

use clap::Parser;
use rc_configs::Settings;
use rc_core::{Notifier, PolicyBinding, Registry, SpamClassifier};
use rc_db_sqlite::{article_policy, SqliteArticleRepo, SqliteCommentRepo, SqlitePool};
use tracing_subscriber::EnvFilter;

// Feature-gated imports
#[cfg(feature = "spam-akismet")]
use rc_spam_akismet::AkismetClient;

#[cfg(feature = "notify-webhook")]
use rc_notify_webhook::WebhookNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = cli::Cli::parse();
    let settings = Settings::load()?;

    let pool = rc_db_sqlite::connect(&settings.database.url).await?;
    let registry = rc_core::registry::install(build_registry(&settings, pool.clone())?)?;
    tracing::debug!(configurations = registry.len(), "registry installed");

    let outcome = cli::run(args, &settings, registry, SqliteArticleRepo::new(pool)).await;
    registry.drain_notifications().await;
    outcome
}

#[cfg(feature = "spam-akismet")]
fn classifier(settings: &Settings) -> anyhow::Result<Option<Arc<dyn SpamClassifier>>> {
    use secrecy::{ExposeSecret, SecretString};

    let Some(akismet) = &settings.akismet else {
        return Ok(None);
    };
    let key = SecretString::from(akismet.api_key.expose_secret().to_string());
    let client = AkismetClient::new(key, &akismet.blog_url)?;
    Ok(Some(Arc::new(client)))
}

#[cfg(not(feature = "spam-akismet"))]
fn classifier(settings: &Settings) -> anyhow::Result<Option<Arc<dyn SpamClassifier>>> {
    if settings.akismet.is_some() {
        tracing::warn!("akismet is configured but this build has no spam-akismet feature");
    }
    Ok(None)
}

#[cfg(feature = "notify-webhook")]
fn notifier(settings: &Settings) -> anyhow::Result<Option<Arc<dyn Notifier>>> {
    let Some(webhook) = &settings.webhook else {
        return Ok(None);
    };
    Ok(Some(Arc::new(WebhookNotifier::new(&webhook.url)?)))
}

#[cfg(not(feature = "notify-webhook"))]
fn notifier(settings: &Settings) -> anyhow::Result<Option<Arc<dyn Notifier>>> {
    if settings.webhook.is_some() {
        tracing::warn!("webhook is configured but this build has no notify-webhook feature");
    }
    Ok(None)
}

/// One article configuration per `[comments.<key>]` entry, each with its own
/// comment kind in the shared store.
fn build_registry(settings: &Settings, pool: SqlitePool) -> anyhow::Result<Registry> {
    let classifier = classifier(settings)?;
    let notifier = notifier(settings)?;
    let articles = Arc::new(SqliteArticleRepo::new(pool.clone()));

    let mut builder = Registry::builder();
    for (key, entry) in &settings.comments {
        let mut policy = article_policy(entry.policy.clone());
        if let Some(classifier) = classifier.as_ref().filter(|_| entry.policy.use_external_classifier) {
            policy = policy.classifier(classifier.clone());
        }

        let comments = Arc::new(SqliteCommentRepo::new(pool.clone(), &entry.model_name));
        let mut binding = PolicyBinding::new(policy.build()?, comments, articles.clone());
        if let Some(notifier) = &notifier {
            binding = binding.with_notifier(notifier.clone());
        }
        builder.register(key.as_str(), entry.record_type(), Arc::new(binding))?;
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rc_core::handlers::{self, Response};
    use rc_core::CommentRequest;
    use rc_db_sqlite::Article;

    const SETTINGS: &str = r#"
        [comments.article]
        app_label = "articles"
        model_name = "articlecomment"

        [comments.review]
        app_label = "articles"
        model_name = "reviewcomment"
        [comments.review.policy]
        use_control_question = true
    "#;

    #[tokio::test]
    async fn registry_is_built_from_settings() {
        let settings = Settings::from_toml_str(SETTINGS).unwrap();
        let pool = rc_db_sqlite::connect("sqlite::memory:").await.unwrap();
        let registry = build_registry(&settings, pool.clone()).unwrap();
        assert_eq!(registry.len(), 2);

        let article = Article::new("Hello", None);
        SqliteArticleRepo::new(pool).create(&article).await.unwrap();

        let request = CommentRequest::post([
            ("author_name", "Guest"),
            ("author_email", "guest@example.com"),
            ("body", "first!"),
        ]);
        let posted = handlers::create_comment(&registry, "article", article.id, &request)
            .await
            .unwrap();
        assert!(matches!(posted, Response::Redirect { .. }));

        // Same submission, but this configuration wants the control question.
        let refused = handlers::create_comment(&registry, "review", article.id, &request)
            .await
            .unwrap();
        assert!(matches!(refused, Response::Form { ref errors, .. } if errors.contains("question")));

        match handlers::comment_list(&registry, "review", None, 1).await.unwrap() {
            Response::Page(page) => assert_eq!(page.total, 0),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn classifier_flag_without_akismet_fails_validation() {
        let source = r#"
            [comments.article]
            app_label = "articles"
            model_name = "articlecomment"
            [comments.article.policy]
            use_external_classifier = true
        "#;
        assert!(Settings::from_toml_str(source).is_err());
    }
}
