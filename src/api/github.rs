use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ApiError, AppState};
use crate::mcp::IssueSearch;

fn default_limit() -> u32 {
    30
}

/// `value` must lie in `1..=100`
pub(super) fn check_page_size(name: &str, value: u32) -> Result<(), ApiError> {
    if (1..=100).contains(&value) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "{} must be between 1 and 100 (got {})",
            name, value
        )))
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct RepositoryListParams {
    owner: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
}

#[derive(Debug, Deserialize)]
pub(super) struct CommitListParams {
    #[serde(default = "default_limit")]
    limit: u32,
    sha: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct IssueSearchParams {
    query: String,
    owner: Option<String>,
    repo: Option<String>,
    order: Option<String>,
    sort: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

pub(super) async fn list_repositories(
    State(state): State<AppState>,
    params: Result<Query<RepositoryListParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    check_page_size("limit", params.limit)?;
    let repositories = state
        .github
        .list_repositories(params.owner.as_deref(), params.limit)
        .await?;
    Ok(Json(json!({
        "count": repositories.len(),
        "repositories": repositories,
    })))
}

pub(super) async fn get_repository(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let repository = state
        .github
        .get_repository(&owner, &repo)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Repository {}/{} not found", owner, repo)))?;
    Ok(Json(json!({ "repository": repository })))
}

pub(super) async fn list_commits(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    params: Result<Query<CommitListParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    check_page_size("limit", params.limit)?;
    let commits = state
        .github
        .list_commits(
            &owner,
            &repo,
            params.sha.as_deref(),
            params.path.as_deref(),
            params.limit,
        )
        .await?;
    Ok(Json(json!({ "count": commits.len(), "commits": commits })))
}

pub(super) async fn get_commit(
    State(state): State<AppState>,
    Path((owner, repo, sha)): Path<(String, String, String)>,
) -> Result<Json<Value>, ApiError> {
    let commit = state.github.get_commit(&owner, &repo, &sha).await?;
    Ok(Json(json!({ "commit": commit })))
}

pub(super) async fn search_issues(
    State(state): State<AppState>,
    params: Result<Query<IssueSearchParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    if params.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }
    if params.page == Some(0) {
        return Err(ApiError::BadRequest("page must be at least 1".to_string()));
    }
    if let Some(per_page) = params.per_page {
        check_page_size("per_page", per_page)?;
    }

    let issues = state
        .github
        .search_issues(IssueSearch {
            query: params.query,
            owner: params.owner,
            repo: params.repo,
            order: params.order,
            sort: params.sort,
            page: params.page,
            per_page: params.per_page,
        })
        .await?;
    Ok(Json(json!({ "count": issues.len(), "issues": issues })))
}
