use super::*;
use crate::mcp::testing::{Calls, FakeConnector, last_call, text_result};
use serial_test::serial;

const TOKEN_ENV: &str = "DOBB_TEST_JIRA_TOKEN";

fn client(tools: &[&str]) -> (JiraClient, Calls) {
    let connector = FakeConnector::new(tools, |tool, arguments| {
        text_result(&json!({ "tool": tool, "echo": arguments }))
    });
    let calls = connector.calls();
    (JiraClient::new(McpClientManager::new(connector)), calls)
}

fn configured() -> JiraConfig {
    JiraConfig {
        url: Some("https://acme.atlassian.net".to_string()),
        username: Some("bot@acme.test".to_string()),
        api_token_env: TOKEN_ENV.to_string(),
        ..JiraConfig::default()
    }
}

fn sample_issue() -> NewIssue {
    NewIssue {
        project_key: "SHOP".to_string(),
        summary: "Checkout fails".to_string(),
        description: "Steps to reproduce".to_string(),
        issue_type: "Bug".to_string(),
    }
}

#[tokio::test]
async fn modern_tool_names_are_preferred() {
    let (jira, calls) = client(&[
        "jira_search",
        "jira_get_issue",
        "jira_create_issue",
        "search_issues",
    ]);

    jira.search_issues("project = SHOP", 25)
        .await
        .expect("search should succeed");
    assert_eq!(
        last_call(&calls),
        (
            "jira_search".to_string(),
            json!({ "jql": "project = SHOP", "limit": 25 })
        )
    );

    jira.get_issue("SHOP-1").await.expect("issue should load");
    assert_eq!(
        last_call(&calls),
        (
            "jira_get_issue".to_string(),
            json!({ "issue_key": "SHOP-1" })
        )
    );

    let created = jira
        .create_issue(sample_issue())
        .await
        .expect("issue should be created");
    assert_eq!(created["tool"], "jira_create_issue");
    assert_eq!(created["echo"]["issue_type"], "Bug");
}

#[tokio::test]
async fn legacy_servers_get_camel_case_arguments() {
    let (jira, calls) = client(&["search_issues", "get_issue", "create_issue"]);

    jira.search_issues("assignee = me", 10)
        .await
        .expect("search should succeed");
    assert_eq!(
        last_call(&calls),
        (
            "search_issues".to_string(),
            json!({ "jql": "assignee = me", "maxResults": 10 })
        )
    );

    jira.get_issue("OLD-7").await.expect("issue should load");
    assert_eq!(last_call(&calls).1, json!({ "key": "OLD-7" }));

    jira.create_issue(sample_issue())
        .await
        .expect("issue should be created");
    assert_eq!(
        last_call(&calls),
        (
            "create_issue".to_string(),
            json!({
                "projectKey": "SHOP",
                "summary": "Checkout fails",
                "description": "Steps to reproduce",
                "issueType": "Bug"
            })
        )
    );
}

#[tokio::test]
async fn generic_calls_pass_arguments_through() {
    let (jira, calls) = client(&["jira_get_transitions"]);

    let tools = jira.list_tools().await.expect("tools should be listed");
    assert_eq!(tools.len(), 1);

    let mut arguments = Map::new();
    arguments.insert("issue_key".to_string(), json!("SHOP-9"));
    let result = jira
        .call_tool("jira_get_transitions", arguments)
        .await
        .expect("call should succeed");

    assert_eq!(result["echo"]["issue_key"], "SHOP-9");
    assert_eq!(last_call(&calls).0, "jira_get_transitions");

    let unknown = jira.call_tool("jira_delete_everything", Map::new()).await;
    assert!(matches!(unknown, Err(DobbError::Validation(_))));
}

#[test]
#[serial]
fn launch_plan_prefers_docker_when_available() {
    // SAFETY: env mutation is confined to serial tests
    unsafe { std::env::set_var(TOKEN_ENV, "secret") };
    let connector = JiraConnector::new(JiraConfig {
        docker_image: Some("ghcr.io/sooperset/mcp-atlassian:latest".to_string()),
        ..configured()
    });

    let docker = connector.launch_plan(true).expect("plan should build");
    assert_eq!(docker.command, "docker");
    assert_eq!(
        docker.args,
        vec![
            "run",
            "-i",
            "--rm",
            "-e",
            "JIRA_URL",
            "-e",
            "JIRA_USERNAME",
            "-e",
            "JIRA_API_TOKEN",
            "-e",
            "JIRA_VERIFY_SSL",
            "ghcr.io/sooperset/mcp-atlassian:latest"
        ]
    );
    assert!(docker
        .env
        .contains(&("JIRA_API_TOKEN".to_string(), "secret".to_string())));

    let fallback = connector.launch_plan(false).expect("plan should build");
    assert_eq!(fallback.command, "npx");
    assert_eq!(
        fallback.args,
        vec!["-y", "@modelcontextprotocol/server-atlassian"]
    );
    assert!(fallback
        .env
        .contains(&("JIRA_VERIFY_SSL".to_string(), "true".to_string())));

    unsafe { std::env::remove_var(TOKEN_ENV) };
}

#[test]
#[serial]
fn missing_credentials_fail_before_launch() {
    // SAFETY: env mutation is confined to serial tests
    unsafe { std::env::set_var(TOKEN_ENV, "secret") };

    let no_url = JiraConnector::new(JiraConfig {
        url: None,
        ..configured()
    });
    assert!(matches!(
        no_url.launch_plan(false),
        Err(DobbError::Connection(ref m)) if m.contains("JIRA_URL")
    ));

    let no_user = JiraConnector::new(JiraConfig {
        username: None,
        ..configured()
    });
    assert!(matches!(
        no_user.launch_plan(false),
        Err(DobbError::Connection(ref m)) if m.contains("JIRA_USERNAME")
    ));

    unsafe { std::env::remove_var(TOKEN_ENV) };
    let no_token = JiraConnector::new(configured());
    assert!(matches!(
        no_token.launch_plan(false),
        Err(DobbError::Connection(ref m)) if m.contains(TOKEN_ENV)
    ));
}
