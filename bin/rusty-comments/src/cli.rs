use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use rc_configs::Settings;
use rc_core::handlers::{self, Response};
use rc_core::{CommentRequest, PermissionChecker, Registry, User};
use rc_db_sqlite::{Article, SqliteArticleRepo};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "rusty-comments", version, about = "Comments for any registered record type")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage commentable articles
    #[command(subcommand)]
    Article(ArticleCommand),
    /// Show the registered comment configurations
    Keys,
    /// Submit a comment as an anonymous visitor
    Post(PostArgs),
    /// Show one page of comments
    List {
        key: String,
        #[arg(long)]
        target: Option<Uuid>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Delete a comment as the operator
    Delete {
        key: String,
        target: Uuid,
        comment: Uuid,
    },
}

#[derive(Debug, Subcommand)]
pub enum ArticleCommand {
    Add {
        title: String,
        #[arg(long)]
        owner: Option<Uuid>,
        /// Start with comments disabled
        #[arg(long)]
        closed: bool,
        /// Backdate the publication
        #[arg(long, default_value_t = 0)]
        days_ago: i64,
    },
    List,
    Open {
        id: Uuid,
    },
    Close {
        id: Uuid,
    },
}

#[derive(Debug, Args)]
pub struct PostArgs {
    pub key: String,
    pub target: Uuid,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub email: String,
    #[arg(long, default_value = "")]
    pub website: String,
    #[arg(long)]
    pub body: String,
    /// Answer to the control question, when the configuration asks one
    #[arg(long)]
    pub answer: Option<String>,
    #[arg(long)]
    pub preview: bool,
    #[arg(long, default_value = "127.0.0.1")]
    pub ip: String,
}

impl PostArgs {
    fn into_request(self) -> CommentRequest {
        let mut fields = vec![
            ("author_name", self.name),
            ("author_email", self.email),
            ("author_website", self.website),
            ("body", self.body),
        ];
        if let Some(answer) = self.answer {
            fields.push(("question", answer));
        }
        if self.preview {
            fields.push(("submit", "preview".to_string()));
        }
        CommentRequest::post(fields).with_remote_addr(self.ip)
    }
}

/// The operator may delete anything.
struct OperatorPermissions;

impl PermissionChecker for OperatorPermissions {
    fn has_perm(&self, _user: &User, _permission: &str) -> bool {
        true
    }
}

fn print(response: &Response) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

pub async fn run(
    cli: Cli,
    settings: &Settings,
    registry: &Registry,
    articles: SqliteArticleRepo,
) -> anyhow::Result<()> {
    match cli.command {
        Command::Article(command) => article(command, &articles).await,
        Command::Keys => {
            for registration in registry.all() {
                println!(
                    "{}\t{}.{}",
                    registration.key,
                    registration.record_type.app_label,
                    registration.record_type.model_name
                );
            }
            Ok(())
        }
        Command::Post(args) => {
            let key = args.key.clone();
            let target = args.target;
            let response =
                handlers::create_comment(registry, &key, target, &args.into_request()).await?;
            print(&response)
        }
        Command::List { key, target, page } => {
            print(&handlers::comment_list(registry, &key, target, page).await?)
        }
        Command::Delete {
            key,
            target,
            comment,
        } => {
            let operator = User::new(settings.operator.clone(), "");
            let request = CommentRequest::post(Vec::<(String, String)>::new())
                .with_actor(operator)
                .with_permissions(Arc::new(OperatorPermissions));
            print(&handlers::delete_comment(registry, &key, target, comment, &request).await?)
        }
    }
}

fn published_days_ago(days_ago: i64) -> anyhow::Result<DateTime<Utc>> {
    Duration::try_days(days_ago)
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .with_context(|| format!("--days-ago {days_ago} is out of range"))
}

async fn article(command: ArticleCommand, articles: &SqliteArticleRepo) -> anyhow::Result<()> {
    match command {
        ArticleCommand::Add {
            title,
            owner,
            closed,
            days_ago,
        } => {
            let mut article = Article::new(title, owner);
            article.allow_comments = !closed;
            article.pub_date = published_days_ago(days_ago)?;
            articles.create(&article).await?;
            println!("{}", article.id);
        }
        ArticleCommand::List => {
            for article in articles.list().await? {
                let state = if article.allow_comments { "open" } else { "closed" };
                println!(
                    "{}\t{}\t{}\t{}",
                    article.id,
                    article.pub_date.date_naive(),
                    state,
                    article.title
                );
            }
        }
        ArticleCommand::Open { id } | ArticleCommand::Close { id } => {
            let allow = matches!(command, ArticleCommand::Open { .. });
            if !articles.set_allow_comments(id, allow).await? {
                anyhow::bail!("no article {id}");
            }
        }
    }
    Ok(())
}
