use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::github::check_page_size;
use super::{ApiError, AppState};
use crate::mcp::NewIssue;

#[derive(Debug, Deserialize)]
pub(super) struct IssueSearchParams {
    jql: String,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub(super) async fn list_tools(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let tools = state.jira.list_tools().await?;
    Ok(Json(json!({ "count": tools.len(), "tools": tools })))
}

/// Body is `{"arguments": {...}}`, a bare argument object, or empty
fn tool_arguments(body: &[u8]) -> Result<Map<String, Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Request body is not JSON: {}", e)))?;
    match payload {
        Value::Object(mut object) => match object.remove("arguments") {
            Some(Value::Object(arguments)) => Ok(arguments),
            Some(Value::Null) | None => Ok(object),
            Some(_) => Err(ApiError::BadRequest(
                "arguments must be an object".to_string(),
            )),
        },
        Value::Null => Ok(Map::new()),
        _ => Err(ApiError::BadRequest(
            "Request body must be a JSON object".to_string(),
        )),
    }
}

pub(super) async fn call_tool(
    State(state): State<AppState>,
    Path(tool_name): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let arguments = tool_arguments(&body)?;
    let result = state.jira.call_tool(&tool_name, arguments).await?;
    Ok(Json(json!({ "result": result })))
}

pub(super) async fn search_issues(
    State(state): State<AppState>,
    params: Result<Query<IssueSearchParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    if params.jql.trim().is_empty() {
        return Err(ApiError::BadRequest("jql must not be empty".to_string()));
    }
    check_page_size("limit", params.limit)?;

    let found = state.jira.search_issues(&params.jql, params.limit).await?;
    let issues = match found {
        Value::Object(mut object) if object.contains_key("issues") => {
            object.remove("issues").unwrap_or(Value::Null)
        }
        other => other,
    };
    Ok(Json(match &issues {
        Value::Array(items) => json!({ "count": items.len(), "issues": issues }),
        _ => json!({ "issues": issues }),
    }))
}

pub(super) async fn get_issue(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let issue = state.jira.get_issue(&key).await?;
    Ok(Json(json!({ "issue": issue })))
}

/// First non-empty string among `keys`
fn string_field(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

pub(super) async fn create_issue(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    let (Some(project_key), Some(summary)) = (
        string_field(&payload, &["projectKey", "project_key"]),
        string_field(&payload, &["summary"]),
    ) else {
        return Err(ApiError::BadRequest(
            "projectKey and summary are required".to_string(),
        ));
    };

    let created = state
        .jira
        .create_issue(NewIssue {
            project_key,
            summary,
            description: string_field(&payload, &["description"]).unwrap_or_default(),
            issue_type: string_field(&payload, &["issueType", "issue_type"])
                .unwrap_or_else(|| "Task".to_string()),
        })
        .await?;
    Ok(Json(json!({ "issue": created })))
}
