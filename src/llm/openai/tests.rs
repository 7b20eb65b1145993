use super::*;
use crate::llm::ChatTurn;
use serde_json::json;
use serial_test::serial;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY_ENV: &str = "DOBB_TEST_OPENAI_KEY";

fn config_for(server_uri: &str, key_env: &str) -> LlmConfig {
    LlmConfig {
        base_url: Some(server_uri.to_string()),
        api_key_env: Some(key_env.to_string()),
        model: "test-model".to_string(),
        ..LlmConfig::default()
    }
}

fn set_key() {
    // SAFETY: env-mutating tests are serialized
    unsafe { std::env::set_var(KEY_ENV, "sk-test") };
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn sends_system_then_turns_in_order() {
    set_key();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "what now?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-model-0125",
            "choices": [{
                "message": {"role": "assistant", "content": "Nothing."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 2, "total_tokens": 14}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiChatClient::new(&config_for(&server.uri(), KEY_ENV))
        .expect("client should build");
    let prompt = Prompt {
        system: "be brief".to_string(),
        turns: vec![
            ChatTurn::user("hi"),
            ChatTurn::assistant("hello"),
            ChatTurn::user("what now?"),
        ],
    };

    let response = tokio::task::spawn_blocking(move || client.complete(&prompt))
        .await
        .expect("task should join")
        .expect("completion should succeed");

    assert_eq!(response.text, "Nothing.");
    assert_eq!(response.model, "test-model-0125");
    assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    assert_eq!(response.usage.map(|u| u.total_tokens), Some(14));
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn error_status_is_upstream_error_with_body() {
    set_key();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string(r#"{"error":{"message":"context_length_exceeded"}}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiChatClient::new(&config_for(&server.uri(), KEY_ENV))
        .expect("client should build");
    let result = tokio::task::spawn_blocking(move || client.complete(&Prompt::single("", "x")))
        .await
        .expect("task should join");

    match result {
        Err(DobbError::Upstream(message)) => {
            assert!(message.contains("context_length_exceeded"), "{}", message)
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn empty_choices_is_upstream_error() {
    set_key();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let client = OpenAiChatClient::new(&config_for(&server.uri(), KEY_ENV))
        .expect("client should build");
    let result = tokio::task::spawn_blocking(move || client.complete(&Prompt::single("", "x")))
        .await
        .expect("task should join");

    assert!(matches!(result, Err(DobbError::Upstream(_))));
}

#[test]
fn missing_key_fails_before_any_request() {
    let client = OpenAiChatClient::new(&config_for(
        "http://127.0.0.1:9",
        "DOBB_TEST_KEY_THAT_IS_NEVER_SET",
    ))
    .expect("client should build without a key");

    let result = client.complete(&Prompt::single("", "hello"));
    assert!(matches!(result, Err(DobbError::Config(_))));
}

#[test]
fn groq_defaults_point_at_groq() {
    let client = OpenAiChatClient::new(&LlmConfig::default()).expect("client should build");
    assert_eq!(
        client.endpoint,
        "https://api.groq.com/openai/v1/chat/completions"
    );
    assert_eq!(client.api_key_env, "GROQ_API_KEY");
    assert_eq!(client.model_id(), "llama-3.3-70b-versatile");
}
