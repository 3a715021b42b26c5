//! Configuration for the chat server.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::chat::core::errors::{ChatError, ChatResult};

/// Top-level configuration for the application.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Completion API settings.
    pub llm: LlmConfig,
    /// Response mode settings (terse vs elaborate).
    pub modes: ModeConfig,
    /// Context window settings.
    pub context: ContextConfig,
    /// Rolling summary settings.
    pub summary: SummaryConfig,
    /// Speech synthesis settings.
    pub tts: TtsConfig,
}

impl AppConfig {
    /// Build the default configuration overlaid with environment variables.
    ///
    /// # Errors
    /// Returns an error if a numeric variable cannot be parsed or the result
    /// fails [`AppConfig::validate`].
    pub fn from_env() -> ChatResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns an error if a numeric variable cannot be parsed or the result
    /// fails [`AppConfig::validate`].
    pub fn from_lookup<F>(lookup: F) -> ChatResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.llm.api_key = lookup("GROQ_API_KEY").filter(|key| !key.trim().is_empty());
        if let Some(url) = lookup("GROQ_API_URL") {
            config.llm.api_url = url;
        }
        if let Some(model) = lookup("VOCALIS_MODEL") {
            config.llm.model = model;
        }
        if let Some(secs) = lookup("VOCALIS_LLM_TIMEOUT_SECS") {
            config.llm.timeout_seconds = parse_var("VOCALIS_LLM_TIMEOUT_SECS", &secs)?;
        }
        if let Some(port) = lookup("VOCALIS_PORT") {
            config.server.port = parse_var("VOCALIS_PORT", &port)?;
        }
        if let Some(dir) = lookup("VOCALIS_STATIC_DIR") {
            config.server.static_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("VOCALIS_DB_PATH") {
            config.storage.sqlite_path = PathBuf::from(path);
        }
        if let Some(workers) = lookup("VOCALIS_SUMMARY_WORKERS") {
            config.summary.workers = parse_var("VOCALIS_SUMMARY_WORKERS", &workers)?;
        }
        if let Some(url) = lookup("VOCALIS_TTS_URL") {
            config.tts.base_url = url;
        }
        if let Some(lang) = lookup("VOCALIS_TTS_LANG") {
            config.tts.lang = lang;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ChatResult<()> {
        if self.context.history_window == 0 {
            return Err(ChatError::InvalidConfig(
                "context.history_window must be > 0".to_string(),
            ));
        }

        if self.context.history_fetch < self.context.history_window {
            return Err(ChatError::InvalidConfig(
                "context.history_fetch must be >= context.history_window".to_string(),
            ));
        }

        if self.summary.window == 0 {
            return Err(ChatError::InvalidConfig(
                "summary.window must be > 0".to_string(),
            ));
        }

        if self.summary.workers == 0 {
            return Err(ChatError::InvalidConfig(
                "summary.workers must be > 0".to_string(),
            ));
        }

        if self.summary.queue_capacity == 0 {
            return Err(ChatError::InvalidConfig(
                "summary.queue_capacity must be > 0".to_string(),
            ));
        }

        if self.llm.timeout_seconds == 0 {
            return Err(ChatError::InvalidConfig(
                "llm.timeout_seconds must be > 0".to_string(),
            ));
        }

        if self.modes.directive.trim().is_empty() {
            return Err(ChatError::InvalidConfig(
                "modes.directive must not be empty".to_string(),
            ));
        }

        if self.tts.chunk_chars == 0 {
            return Err(ChatError::InvalidConfig(
                "tts.chunk_chars must be > 0".to_string(),
            ));
        }

        Url::parse(&self.llm.api_url)?;
        Url::parse(&self.tts.base_url)?;

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> ChatResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ChatError::InvalidConfig(format!("{key} has an invalid value: {value}")))
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port.
    pub port: u16,
    /// Directory with the static pages.
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            static_dir: PathBuf::from("static"),
        }
    }
}

/// Storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Turn table name.
    pub turn_table: String,
    /// Conversation table name.
    pub conversation_table: String,
    /// User table name.
    pub user_table: String,
    /// Session table name.
    pub session_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("vocalis.sqlite"),
            turn_table: "chat_turns".to_string(),
            conversation_table: "conversations".to_string(),
            user_table: "users".to_string(),
            session_table: "sessions".to_string(),
        }
    }
}

/// Completion API settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Bearer key; `None` disables chat completions.
    pub api_key: Option<String>,
    /// Chat completions endpoint.
    pub api_url: String,
    /// Model name.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl LlmConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            timeout_seconds: 15,
        }
    }
}

/// Sampling parameters for a response mode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModeParams {
    /// System instruction.
    pub instruction: String,
    /// Output budget in tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Response mode settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModeConfig {
    /// Token that switches a message into elaborate mode.
    pub directive: String,
    /// Default (short answer) mode.
    pub terse: ModeParams,
    /// Elaborate (detailed answer) mode.
    pub elaborate: ModeParams,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            directive: "elaborate".to_string(),
            terse: ModeParams {
                instruction: "You are an AI assistant for visually impaired users. Provide concise, minimal answers. Keep responses brief and to the point unless specifically asked to elaborate.".to_string(),
                max_tokens: 300,
                temperature: 0.2,
            },
            elaborate: ModeParams {
                instruction: "You are an AI assistant for visually impaired users. Provide detailed, comprehensive explanations. Be thorough and educational while maintaining clarity.".to_string(),
                max_tokens: 800,
                temperature: 0.7,
            },
        }
    }
}

/// Context window settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Turns loaded from storage per request.
    pub history_fetch: usize,
    /// Turns forwarded verbatim to the model.
    pub history_window: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_fetch: 20,
            history_window: 10,
        }
    }
}

/// Rolling summary settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// A summary younger than this is fresh (seconds).
    pub max_age_seconds: u64,
    /// New messages since the last summary that force a refresh.
    pub min_new_messages: u64,
    /// Turns rendered into the summarization prompt.
    pub window: usize,
    /// Target summary length in words.
    pub max_words: usize,
    /// Output budget for the summary call.
    pub max_tokens: u32,
    /// Sampling temperature for the summary call.
    pub temperature: f32,
    /// Number of summary workers.
    pub workers: usize,
    /// Pending job capacity.
    pub queue_capacity: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: 15 * 60,
            min_new_messages: 15,
            window: 20,
            max_words: 150,
            max_tokens: 300,
            temperature: 0.3,
            workers: 2,
            queue_capacity: 256,
        }
    }
}

/// Speech synthesis settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Speech endpoint.
    pub base_url: String,
    /// Spoken language code.
    pub lang: String,
    /// Maximum characters per upstream request.
    pub chunk_chars: usize,
    /// Maximum characters accepted per synthesis.
    pub max_text_chars: usize,
    /// Cached synthesized phrases.
    pub cache_capacity: usize,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://translate.google.com/translate_tts".to_string(),
            lang: "en".to_string(),
            chunk_chars: 100,
            max_text_chars: 5000,
            cache_capacity: 64,
            timeout_seconds: 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.context.history_fetch, 20);
        assert_eq!(config.context.history_window, 10);
        assert_eq!(config.summary.max_age_seconds, 900);
        assert_eq!(config.summary.min_new_messages, 15);
        assert_eq!(config.llm.timeout_seconds, 15);
    }

    #[test]
    fn env_overrides_apply() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GROQ_API_KEY", "gsk_test"),
            ("VOCALIS_PORT", "8080"),
            ("VOCALIS_DB_PATH", "/tmp/chat.sqlite"),
            ("VOCALIS_SUMMARY_WORKERS", "4"),
        ]))
        .unwrap();

        assert_eq!(config.llm.api_key.as_deref(), Some("gsk_test"));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.sqlite_path, PathBuf::from("/tmp/chat.sqlite"));
        assert_eq!(config.summary.workers, 4);
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let config = AppConfig::from_lookup(lookup(&[("GROQ_API_KEY", "   ")])).unwrap();
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("VOCALIS_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ChatError::InvalidConfig(_)));
    }

    #[test]
    fn window_larger_than_fetch_is_rejected() {
        let mut config = AppConfig::default();
        config.context.history_window = 30;
        assert!(config.validate().is_err());
    }
}
