use pagewise::config::{AppConfig, load_llm_settings};
use pagewise::llm::EndpointType;
use serial_test::serial;
use std::env;
use std::fs;
use std::time::Duration;

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("PAGEWISE_CONFIG");
        env::remove_var("PAGEWISE_AGENT__MAX_ITERATIONS");
        env::remove_var("PAGEWISE_LLM__MODEL");
        env::remove_var("PAGEWISE_CACHE__ENABLED");
        for key in [
            "LLM_ENDPOINT",
            "LLM_MODEL",
            "LLM_API_KEY",
            "LLM_ENDPOINT_TYPE",
            "LLM_TEMPERATURE",
            "LLM_MAX_TOKENS",
            "LLM_TIMEOUT_SECS",
        ] {
            env::remove_var(key);
        }
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from(None).expect("defaults should load");
    assert_eq!(config.agent.max_iterations, 5);
    assert_eq!(config.agent.heartbeat_secs, 15);
    assert_eq!(config.llm.endpoint_type, EndpointType::Standard);
    assert_eq!(config.llm.timeout_secs, 60);
    assert_eq!(config.tools.handshake_timeout_secs, 8);
    assert_eq!(config.tools.call_timeout_secs, 15);
    assert!(config.tools.config_path.is_none());
    assert!(config.cache.enabled);
    assert_eq!(config.page.min_content_chars, 100);
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("PAGEWISE_AGENT__MAX_ITERATIONS", "7");
        env::set_var("PAGEWISE_LLM__MODEL", "qwen3:8b");
        env::set_var("PAGEWISE_CACHE__ENABLED", "false");
    }

    let config = AppConfig::load_from(None).expect("Failed to load config");
    assert_eq!(config.agent.max_iterations, 7);
    assert_eq!(config.llm.model, "qwen3:8b");
    assert!(!config.cache.enabled);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("pagewise.yaml");
    fs::write(
        &file_path,
        r"
llm:
  endpoint: http://gpu-box:8000/v1
  model: mistral
agent:
  max_iterations: 3
tools:
  config_path: /etc/pagewise/tools.json
",
    )
    .unwrap();

    unsafe {
        env::set_var("PAGEWISE_CONFIG", &file_path);
    }

    let config = AppConfig::load().expect("Failed to load config from file");
    assert_eq!(config.agent.max_iterations, 3);
    assert_eq!(config.llm.model, "mistral");
    assert_eq!(
        config.llm.settings().chat_url(),
        "http://gpu-box:8000/v1/chat/completions"
    );
    assert_eq!(
        config.tools.config_path.as_deref(),
        Some(std::path::Path::new("/etc/pagewise/tools.json"))
    );

    clear_env_vars();
}

#[test]
#[serial]
fn test_env_beats_file() {
    clear_env_vars();

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("pagewise.json");
    fs::write(&file_path, r#"{"agent": {"max_iterations": 3}}"#).unwrap();
    unsafe {
        env::set_var("PAGEWISE_AGENT__MAX_ITERATIONS", "9");
    }

    let config = AppConfig::load_from(Some(&file_path)).unwrap();
    assert_eq!(config.agent.max_iterations, 9);

    clear_env_vars();
}

#[test]
#[serial]
fn test_missing_file_is_an_error() {
    clear_env_vars();
    let dir = tempfile::tempdir().unwrap();
    assert!(AppConfig::load_from(Some(&dir.path().join("absent.toml"))).is_err());
}

#[test]
#[serial]
fn test_zero_iterations_rejected() {
    clear_env_vars();
    unsafe {
        env::set_var("PAGEWISE_AGENT__MAX_ITERATIONS", "0");
    }

    let err = AppConfig::load_from(None).unwrap_err();
    assert!(err.to_string().contains("max_iterations"));

    clear_env_vars();
}

#[test]
#[serial]
fn test_llm_settings_from_env() {
    clear_env_vars();

    assert!(load_llm_settings().is_err());

    unsafe {
        env::set_var("LLM_ENDPOINT", "https://llm.internal/api/chat");
        env::set_var("LLM_MODEL", "llama3.2");
        env::set_var("LLM_ENDPOINT_TYPE", "custom");
        env::set_var("LLM_API_KEY", "  ");
        env::set_var("LLM_TIMEOUT_SECS", "30");
    }

    let s = load_llm_settings().unwrap();
    assert_eq!(s.chat_url(), "https://llm.internal/api/chat");
    assert_eq!(s.model, "llama3.2");
    assert!(s.api_key.is_none());
    assert_eq!(s.timeout, Duration::from_secs(30));

    unsafe {
        env::set_var("LLM_MAX_TOKENS", "lots");
    }
    assert!(load_llm_settings().is_err());

    clear_env_vars();
}
