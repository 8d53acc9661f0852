use super::*;
use std::fs;
use tempfile::TempDir;

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn config_file_persistence() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        let config_path = temp_dir.path().join("config.toml");

        let mut original_config = Config::default();
        original_config.ollama = OllamaConfig {
            protocol: "https".to_string(),
            host: "test-host".to_string(),
            port: 8080,
            embed_model: "test-embed".to_string(),
            chat_model: "test-chat".to_string(),
            timeout_secs: 30,
            retry_attempts: 1,
        };
        original_config.store.keep_backups = 3;

        let toml_content = toml::to_string_pretty(&original_config)
            .expect("config should convert to toml string successfully");
        fs::write(&config_path, toml_content).expect("should write to config_path successfully");

        let content =
            fs::read_to_string(&config_path).expect("should read from config_path successfully");
        let loaded_config: Config = toml::from_str(&content).expect("should parse toml correctly");

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn invalid_toml_handling() {
        let invalid_toml = r#"
            [ollama
            host = "localhost"
            port = "invalid_port"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
        assert!(result.is_err());
    }

    #[test]
    fn partial_config_with_defaults() {
        let partial_toml = r#"
            [ollama]
            host = "custom-host"
        "#;

        let config: Config = toml::from_str(partial_toml).expect("missing fields use defaults");
        assert_eq!(config.ollama.host, "custom-host");
        assert_eq!(config.ollama.port, 11434);
        assert_eq!(config.chunking.chunk_size, 800);
    }

    #[test]
    fn wrong_field_type_is_rejected() {
        let bad_toml = r#"
            [store]
            keep_backups = "five"
        "#;

        let result: Result<Config, toml::de::Error> = toml::from_str(bad_toml);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_file_fails_load() {
        let temp_dir = TempDir::new().expect("should create TempDir successfully");
        fs::write(
            temp_dir.path().join("config.toml"),
            "[chunking]\nchunk_size = 100\nchunk_overlap = 150\n",
        )
        .expect("should write config");

        let result = Config::load_from(temp_dir.path());
        assert!(result.is_err());
    }
}
