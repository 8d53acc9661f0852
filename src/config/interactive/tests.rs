use super::load_existing_config as load_existing_config_impl;
use crate::config::settings::ENV_DATA_DIR;
use serial_test::serial;
use tempfile::TempDir;

#[test]
#[serial]
fn load_existing_config() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    // SAFETY: every test touching the environment runs under #[serial]
    unsafe {
        std::env::set_var(ENV_DATA_DIR, temp_dir.path());
    }
    let result = load_existing_config_impl();
    unsafe {
        std::env::remove_var(ENV_DATA_DIR);
    }

    let config = result.expect("config loaded successfully");
    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert!(!config.ollama.host.is_empty());
    assert!(config.ollama.port > 0);
    assert!(!config.ollama.embed_model.is_empty());
    assert!(!config.ollama.chat_model.is_empty());
    assert!(config.store.keep_backups > 0);
}
