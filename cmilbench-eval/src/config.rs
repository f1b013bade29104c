//! Configuration management for the evaluation harness
//!
//! Loads judge, runner and path settings from a TOML file. Every field has a
//! default, so a partial file (or none at all) is valid.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// The OpenAI-compatible endpoint used as judge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_judge_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Requests per minute
    #[serde(default = "default_rpm")]
    pub rpm: u32,
    /// Tokens per minute
    #[serde(default = "default_tpm")]
    pub tpm: u32,
}

/// Judge stage execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_checkpoint_items")]
    pub checkpoint_interval_items: usize,
    #[serde(default = "default_checkpoint_secs")]
    pub checkpoint_interval_secs: u64,
    /// Judge only a seeded random sample of pending items
    #[serde(default)]
    pub sample_size: Option<usize>,
    #[serde(default = "default_sample_seed")]
    pub sample_seed: u64,
}

/// Input and output directories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_predictions_dir")]
    pub predictions_dir: PathBuf,
    #[serde(default = "default_extracted_dir")]
    pub extracted_dir: PathBuf,
    #[serde(default = "default_judge_dir")]
    pub judge_dir: PathBuf,
    #[serde(default = "default_test_data_dir")]
    pub test_data_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

// Default value functions
fn default_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_judge_model() -> String { "gpt-4o".to_string() }
fn default_temperature() -> f32 { 0.2 }
fn default_max_tokens() -> u32 { 2048 }
fn default_rpm() -> u32 { 60 }
fn default_tpm() -> u32 { 100_000 }
fn default_max_workers() -> usize { 5 }
fn default_retry_count() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 2000 }
fn default_max_retry_delay_ms() -> u64 { 60_000 }
fn default_timeout_ms() -> u64 { 30_000 }
fn default_checkpoint_items() -> usize { 10 }
fn default_checkpoint_secs() -> u64 { 300 }
fn default_sample_seed() -> u64 { 42 }
fn default_predictions_dir() -> PathBuf { PathBuf::from("results/predictions") }
fn default_extracted_dir() -> PathBuf { PathBuf::from("results/extracted") }
fn default_judge_dir() -> PathBuf { PathBuf::from("results/llm_evaluation") }
fn default_test_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_output_dir() -> PathBuf { PathBuf::from("results/evaluation") }

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            model: default_judge_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            rpm: default_rpm(),
            tpm: default_tpm(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            timeout_ms: default_timeout_ms(),
            checkpoint_interval_items: default_checkpoint_items(),
            checkpoint_interval_secs: default_checkpoint_secs(),
            sample_size: None,
            sample_seed: default_sample_seed(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            predictions_dir: default_predictions_dir(),
            extracted_dir: default_extracted_dir(),
            judge_dir: default_judge_dir(),
            test_data_dir: default_test_data_dir(),
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from the default config location or return defaults
    pub fn load_or_default() -> Self {
        let config_paths = ["config/cmilbench.toml", "../config/cmilbench.toml"];

        for path in &config_paths {
            match Self::from_file(path) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path);
                    return config;
                }
                Err(ConfigError::Io(_)) => {}
                Err(e) => tracing::warn!("Ignoring {}: {}", path, e),
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// API key read from the configured environment variable
    pub fn judge_api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.judge.api_key_env)
            .map_err(|_| ConfigError::MissingEnv(self.judge.api_key_env.clone()))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("{0} not set")]
    MissingEnv(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.judge.model, "gpt-4o");
        assert_eq!(config.runner.max_workers, 5);
        assert_eq!(config.runner.timeout_ms, 30_000);
        assert!(config.runner.sample_size.is_none());
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
[judge]
model = "judge-model"
rpm = 10

[runner]
sample_size = 20

[paths]
judge_dir = "/tmp/judge"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.judge.model, "judge-model");
        assert_eq!(config.judge.rpm, 10);
        assert_eq!(config.judge.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.runner.sample_size, Some(20));
        assert_eq!(config.runner.checkpoint_interval_items, 10);
        assert_eq!(config.paths.judge_dir, PathBuf::from("/tmp/judge"));
        assert_eq!(config.paths.output_dir, PathBuf::from("results/evaluation"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config/cmilbench.toml");

        let mut config = Config::default();
        config.runner.max_workers = 2;
        config.save_toml(&path).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.runner.max_workers, 2);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::from_toml("[runner]\nmax_workers = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
