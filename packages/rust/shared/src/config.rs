//! Application configuration for StudyCards.
//!
//! User config lives at `~/.studycards/studycards.toml`.
//! CLI flags and environment variables override config file values, which
//! override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, StudyCardsError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "studycards.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".studycards";

// ---------------------------------------------------------------------------
// Config structs (matching studycards.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// OpenAI chat completion settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Cross-origin settings for the browser client.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Assistant rate limits.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Database location.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Chat model used for answers and suggestions.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Completion budget for assistant answers.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Completion budget for suggestion lists.
    #[serde(default = "default_suggestions_max_tokens")]
    pub suggestions_max_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            suggestions_max_tokens: default_suggestions_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    500
}
fn default_suggestions_max_tokens() -> u32 {
    200
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[cors]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed browser origin.
    #[serde(default = "default_cors_origin")]
    pub origin: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origin: default_cors_origin(),
        }
    }
}

fn default_cors_origin() -> String {
    "http://localhost:8080".into()
}

/// `[rate_limit]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Max assistant questions per token per window.
    #[serde(default = "default_assistant_max")]
    pub assistant_max: u32,

    /// Max suggestion requests per token per window.
    #[serde(default = "default_suggestions_max")]
    pub suggestions_max: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            assistant_max: default_assistant_max(),
            suggestions_max: default_suggestions_max(),
        }
    }
}

fn default_window_secs() -> u64 {
    15 * 60
}
fn default_assistant_max() -> u32 {
    20
}
fn default_suggestions_max() -> u32 {
    30
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file. When unset, data lives in process memory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl AppConfig {
    /// Check values that would otherwise fail late at request time.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.openai.base_url).map_err(|e| {
            StudyCardsError::config(format!(
                "invalid openai.base_url '{}': {e}",
                self.openai.base_url
            ))
        })?;

        if !(0.0..=2.0).contains(&self.openai.temperature) {
            return Err(StudyCardsError::config(format!(
                "openai.temperature must be within 0.0..=2.0, got {}",
                self.openai.temperature
            )));
        }

        if self.rate_limit.window_secs == 0 {
            return Err(StudyCardsError::config("rate_limit.window_secs must be > 0"));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.studycards/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| StudyCardsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.studycards/studycards.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| StudyCardsError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        StudyCardsError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| StudyCardsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| StudyCardsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| StudyCardsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the OpenAI API key from the env var named in the config.
pub fn resolve_api_key(config: &OpenAiConfig) -> Result<String> {
    let var_name = &config.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(StudyCardsError::config(format!(
            "OpenAI API key not found. Set the {var_name} environment variable."
        ))),
    }
}
