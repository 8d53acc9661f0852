// Configuration management module
// TOML settings in the data directory plus environment overrides

pub mod interactive;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, OllamaConfig, parse_model_spec};
