use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.llm.provider, LlmProvider::Groq);
    assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
    assert_eq!(config.embeddings.provider, EmbeddingProvider::Ollama);
    assert_eq!(config.embeddings.batch_size, 16);
    assert_eq!(config.chunking.chunk_size, 1000);
    assert_eq!(config.chunking.chunk_overlap, 100);
    assert_eq!(config.store.collection, DEFAULT_COLLECTION);
    assert_eq!(config.chat.context_chunks, 3);
    assert!(config.validate().is_ok());
}

#[test]
fn config_validation() {
    let config = Config::default();

    let mut invalid_config = config.clone();
    invalid_config.server.port = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidPort(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.embeddings.base_url = "ftp://localhost:21".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.embeddings.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.embeddings.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.llm.temperature = 3.5;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.chunking.chunk_overlap = invalid_config.chunking.chunk_size;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidChunkOverlap(_, _))
    ));

    let mut invalid_config = config.clone();
    invalid_config.store.collection = "bad name; drop".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.chat.context_chunks = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.github.repo_url = Some("https://gitlab.com/owner/repo".to_string());
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidRepoUrl(_))
    ));
}

#[test]
fn provider_defaults() {
    let mut llm = LlmConfig::default();
    assert_eq!(llm.base_url(), "https://api.groq.com/openai/v1");
    assert_eq!(llm.api_key_env(), "GROQ_API_KEY");

    llm.provider = LlmProvider::Gemini;
    assert_eq!(llm.api_key_env(), "GOOGLE_API_KEY");

    llm.base_url = Some("http://localhost:9000/v1".to_string());
    assert_eq!(llm.base_url(), "http://localhost:9000/v1");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let toml_str = r#"
        [llm]
        provider = "openai"
        model = "gpt-4o-mini"

        [chunking]
        chunk_size = 200
        chunk_overlap = 50
    "#;
    let config: Config = toml::from_str(toml_str).expect("should parse toml correctly");
    assert_eq!(config.llm.provider, LlmProvider::OpenAi);
    assert_eq!(config.llm.max_tokens, LlmConfig::default().max_tokens);
    assert_eq!(config.chunking.chunk_size, 200);
    assert_eq!(config.embeddings, EmbeddingsConfig::default());
}

#[test]
#[serial]
fn load_missing_file_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config = Config::load(temp_dir.path()).expect("should load default config");
    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.vector_database_path(), temp_dir.path().join("vectors"));
}

#[test]
#[serial]
fn save_then_load() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let mut config = Config {
        base_dir: temp_dir.path().join("nested"),
        ..Config::default()
    };
    config.chat.context_chunks = 5;
    config.save().expect("should save config");

    let loaded = Config::load(temp_dir.path().join("nested")).expect("should load config");
    assert_eq!(loaded.chat.context_chunks, 5);
}

#[test]
#[serial]
fn env_overrides_apply() {
    // SAFETY: env mutation is confined to serial tests
    unsafe {
        std::env::set_var("DOBB_PORT", "9123");
        std::env::set_var("JIRA_USER_NAME", "legacy-user");
        std::env::remove_var("JIRA_USERNAME");
    }

    let mut config = Config::default();
    config.apply_env_overrides();
    assert_eq!(config.server.port, 9123);
    assert_eq!(config.jira.username.as_deref(), Some("legacy-user"));

    unsafe {
        std::env::remove_var("DOBB_PORT");
        std::env::remove_var("JIRA_USER_NAME");
    }
}

#[test]
fn env_value_treats_blank_as_unset() {
    assert_eq!(env_value("DOBB_TEST_VARIABLE_THAT_IS_NEVER_SET"), None);
}
