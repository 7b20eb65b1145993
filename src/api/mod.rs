//! HTTP API
//!
//! JSON in, JSON out. Uploads are multipart with the document in the `file`
//! field. Every failure is rendered by [`ApiError`].

mod assistant;
mod documents;
mod error;
mod github;
mod jira;


use anyhow::Context;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::chat::ChatService;
use crate::config::Config;
use crate::llm::completion_model_from_config;
use crate::mcp::{GithubClient, JiraClient};
use crate::rag::EmbeddingPipeline;
use crate::report::{ReportService, UserStoryService};

pub use error::ApiError;

/// Largest accepted upload
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Shared services, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<EmbeddingPipeline>,
    pub chat: Arc<ChatService>,
    pub report: Arc<ReportService>,
    pub stories: Arc<UserStoryService>,
    pub github: Arc<GithubClient>,
    pub jira: Arc<JiraClient>,
}

impl AppState {
    /// Build every service from configuration.
    ///
    /// MCP servers are not contacted here; each connects on first use.
    #[inline]
    pub async fn from_config(config: &Config) -> crate::Result<Self> {
        let pipeline = Arc::new(EmbeddingPipeline::from_config(config).await?);
        let model = completion_model_from_config(&config.llm)?;
        let chat =
            ChatService::from_config(&config.chat, Arc::clone(&pipeline), Arc::clone(&model))?;
        let report =
            ReportService::from_config(&config.report, Arc::clone(&pipeline), Arc::clone(&model));
        let stories = UserStoryService::from_config(&config.report, Arc::clone(&pipeline), model);

        let github = GithubClient::from_config(&config.github);
        if let Some(repo) = github.enforced_repo() {
            info!("GitHub calls are restricted to {}/{}", repo.owner, repo.repo);
        }

        Ok(Self {
            pipeline,
            chat: Arc::new(chat),
            report: Arc::new(report),
            stories: Arc::new(stories),
            github: Arc::new(github),
            jira: Arc::new(JiraClient::from_config(&config.jira)),
        })
    }
}

/// All routes, without the outer CORS and tracing layers
#[inline]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(assistant::banner))
        .route("/health", get(assistant::health))
        .route("/chatbot", post(assistant::chatbot))
        .route("/report/generate", post(assistant::generate_report))
        .route("/user_stories/generate", post(assistant::generate_user_stories))
        .route("/embedding/text", post(documents::ingest_text))
        .route("/embedding/pdf", post(documents::ingest_pdf))
        .route("/embedding/query", post(documents::query))
        .route("/api/github/repositories", get(github::list_repositories))
        .route(
            "/api/github/repositories/:owner/:repo",
            get(github::get_repository),
        )
        .route(
            "/api/github/repositories/:owner/:repo/commits",
            get(github::list_commits),
        )
        .route(
            "/api/github/repositories/:owner/:repo/commits/:sha",
            get(github::get_commit),
        )
        .route("/api/github/issues/search", get(github::search_issues))
        .route("/api/jira/tools", get(jira::list_tools))
        .route("/api/jira/tools/:tool_name", post(jira::call_tool))
        .route("/api/jira/issues/search", get(jira::search_issues))
        .route("/api/jira/issues/:key", get(jira::get_issue))
        .route("/api/jira/issues", post(jira::create_issue))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Build the services and serve until Ctrl-C
#[inline]
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)
        .await
        .context("Failed to initialize services")?;

    let mut app = router(state.clone());
    if config.server.cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }
    let app = app.layer(TraceLayer::new_for_http());

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down MCP sessions");
    state.github.manager().close().await;
    state.jira.manager().close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
