use crate::Language;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "translator.toml";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const ENV_PREFIX: &str = "TRANSLATOR";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    pub model: String,
    /// Not validated here, a missing key shows up as a failed translation.
    #[serde(default)]
    pub api_key: Option<String>,
    pub source_lang: Language,
    pub target_lang: Language,
    /// Prepended to every translation shown in the chat log.
    pub reply_prefix: String,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// 1 means a single attempt, no retries.
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 1,
            initial_interval_ms: 2 * 1000,
        }
    }
}

impl RetryConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }
}

impl AppConfig {
    /// Loads `path` (or [`DEFAULT_CONFIG_FILE`] if present), then `TRANSLATOR_*` env overrides.
    /// The API key falls back to [`API_KEY_ENV`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::new(&path.to_string_lossy(), FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };
        let builder = Self::defaults()?.add_source(file).add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );
        Self::finish(builder, std::env::var(API_KEY_ENV).ok())
    }

    /// Defaults overlaid with the given TOML, environment is not consulted.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let builder = Self::defaults()?.add_source(File::from_str(toml, FileFormat::Toml));
        Self::finish(builder, None)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let retry = RetryConfig::default();
        Config::builder()
            .set_default(
                "api_base",
                "https://generativelanguage.googleapis.com/v1beta/openai/",
            )?
            .set_default("model", "gemini-2.0-flash")?
            .set_default("source_lang", Language::English.name())?
            .set_default("target_lang", Language::Urdu.name())?
            .set_default("reply_prefix", "Word-by-word translation: ")?
            .set_default("retry.max_attempts", i64::from(retry.max_attempts))?
            .set_default("retry.initial_interval_ms", retry.initial_interval_ms as i64)
    }

    fn finish(
        builder: ConfigBuilder<DefaultState>,
        fallback_api_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
        if cfg.api_key.as_deref().is_none_or(str::is_empty) {
            cfg.api_key = fallback_api_key.filter(|key| !key.is_empty());
        }
        log::debug!(
            "Using model {} at {} ({} -> {} by default)",
            cfg.model,
            cfg.api_base,
            cfg.source_lang,
            cfg.target_lang
        );
        Ok(cfg)
    }
}
