//! Configuration management for the mentor client

pub mod file;

use secrecy::{ExposeSecret, SecretString};

use crate::prompt::SYSTEM_INSTRUCTION;
use crate::{Error, Result};

/// Default model for live voice sessions
pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default model for text chat
pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-pro-preview";

/// Default prebuilt output voice
pub const DEFAULT_VOICE: &str = "Kore";

/// Default bidirectional streaming endpoint
pub const DEFAULT_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default REST endpoint for text chat
pub const DEFAULT_CHAT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default outbound frame queue capacity (about 8 seconds of 4096-sample frames at 16 kHz)
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 32;

/// Mentor client configuration
#[derive(Debug)]
pub struct Config {
    /// Provider API key
    pub api_key: Option<SecretString>,

    /// Live voice session configuration
    pub live: LiveConfig,

    /// Text chat configuration
    pub chat: ChatConfig,

    /// Mentor persona system instruction
    pub system_instruction: String,
}

/// Live voice session configuration
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Model identifier
    pub model: String,

    /// Prebuilt output voice
    pub voice: String,

    /// WebSocket endpoint
    pub endpoint: String,

    /// Outbound frame queue capacity; the oldest frame is dropped when full
    pub outbound_capacity: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_LIVE_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            endpoint: DEFAULT_LIVE_ENDPOINT.to_string(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

/// Text chat configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Model identifier
    pub model: String,

    /// REST API base URL
    pub endpoint: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup
    #[must_use]
    pub fn from_sources(
        fc: file::MentorConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let api_key = env("GEMINI_API_KEY")
            .or_else(|| env("API_KEY"))
            .or(fc.api_key)
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        let live = LiveConfig {
            model: env("MENTOR_LIVE_MODEL")
                .or(fc.live.model)
                .unwrap_or_else(|| DEFAULT_LIVE_MODEL.to_string()),
            voice: env("MENTOR_VOICE")
                .or(fc.live.voice)
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            endpoint: env("MENTOR_LIVE_ENDPOINT")
                .or(fc.live.endpoint)
                .unwrap_or_else(|| DEFAULT_LIVE_ENDPOINT.to_string()),
            outbound_capacity: env("MENTOR_OUTBOUND_CAPACITY")
                .and_then(|s| s.parse().ok())
                .filter(|&c| c > 0)
                .or(fc.live.outbound_capacity.filter(|&c| c > 0))
                .unwrap_or(DEFAULT_OUTBOUND_CAPACITY),
        };

        let chat = ChatConfig {
            model: env("MENTOR_CHAT_MODEL")
                .or(fc.chat.model)
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            endpoint: env("MENTOR_CHAT_ENDPOINT")
                .or(fc.chat.endpoint)
                .unwrap_or_else(|| DEFAULT_CHAT_ENDPOINT.to_string()),
        };

        let system_instruction = fc
            .mentor
            .system_instruction
            .unwrap_or_else(|| SYSTEM_INSTRUCTION.to_string());

        Self {
            api_key,
            live,
            chat,
            system_instruction,
        }
    }

    /// Get the API key, failing if none is configured
    ///
    /// # Errors
    ///
    /// Returns error if neither `GEMINI_API_KEY`, `API_KEY` nor the config file provide a key
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| {
                Error::Config("no API key configured (set GEMINI_API_KEY)".to_string())
            })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_sources(file::MentorConfigFile::default(), |_| None)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert!(config.api_key.is_none());
        assert_eq!(config.live.model, DEFAULT_LIVE_MODEL);
        assert_eq!(config.live.voice, "Kore");
        assert_eq!(config.live.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
        assert_eq!(config.chat.model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.system_instruction, SYSTEM_INSTRUCTION);
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let fc: file::MentorConfigFile = toml::from_str(
            r#"
            api_key = "from-file"
            [live]
            voice = "Puck"
            model = "file-model"
            "#,
        )
        .unwrap();

        let config = Config::from_sources(
            fc,
            env_from(&[("GEMINI_API_KEY", "from-env"), ("MENTOR_VOICE", "Charon")]),
        );

        assert_eq!(config.require_api_key().unwrap(), "from-env");
        assert_eq!(config.live.voice, "Charon");
        assert_eq!(config.live.model, "file-model");
    }

    #[test]
    fn test_fallback_api_key_variable() {
        let config = Config::from_sources(
            file::MentorConfigFile::default(),
            env_from(&[("API_KEY", "legacy")]),
        );
        assert_eq!(config.require_api_key().unwrap(), "legacy");
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let config = Config::from_sources(
            file::MentorConfigFile::default(),
            env_from(&[("GEMINI_API_KEY", "  ")]),
        );
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_zero_capacity_falls_back() {
        let config = Config::from_sources(
            file::MentorConfigFile::default(),
            env_from(&[("MENTOR_OUTBOUND_CAPACITY", "0")]),
        );
        assert_eq!(config.live.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
    }

    fn capacity_file(capacity: usize) -> file::MentorConfigFile {
        toml::from_str(&format!("[live]\noutbound_capacity = {capacity}\n")).unwrap()
    }

    #[test]
    fn test_bad_env_capacity_keeps_file_value() {
        for bad in ["0", "lots"] {
            let config = Config::from_sources(
                capacity_file(64),
                env_from(&[("MENTOR_OUTBOUND_CAPACITY", bad)]),
            );
            assert_eq!(config.live.outbound_capacity, 64);
        }

        let config = Config::from_sources(
            capacity_file(64),
            env_from(&[("MENTOR_OUTBOUND_CAPACITY", "8")]),
        );
        assert_eq!(config.live.outbound_capacity, 8);
    }

    #[test]
    fn test_zero_file_capacity_falls_back() {
        let config = Config::from_sources(capacity_file(0), env_from(&[]));
        assert_eq!(config.live.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
    }
}
