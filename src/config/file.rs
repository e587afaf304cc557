//! TOML configuration file loading
//!
//! Supports `~/.config/mentor-live/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct MentorConfigFile {
    /// API key for the generative-AI provider
    #[serde(default)]
    pub api_key: Option<String>,

    /// Live voice session configuration
    #[serde(default)]
    pub live: LiveFileConfig,

    /// Text chat configuration
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Mentor persona configuration
    #[serde(default)]
    pub mentor: MentorFileConfig,
}

/// Live voice session configuration
#[derive(Debug, Default, Deserialize)]
pub struct LiveFileConfig {
    /// Model identifier (e.g. "gemini-2.5-flash-native-audio-preview-09-2025")
    pub model: Option<String>,

    /// Prebuilt output voice (e.g. "Kore")
    pub voice: Option<String>,

    /// WebSocket endpoint of the bidirectional API
    pub endpoint: Option<String>,

    /// Outbound frame queue capacity
    pub outbound_capacity: Option<usize>,
}

/// Text chat configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// Model identifier (e.g. "gemini-3-pro-preview")
    pub model: Option<String>,

    /// REST API base URL
    pub endpoint: Option<String>,
}

/// Mentor persona configuration
#[derive(Debug, Default, Deserialize)]
pub struct MentorFileConfig {
    /// System instruction override
    pub system_instruction: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `MentorConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> MentorConfigFile {
    config_file_path().map_or_else(MentorConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Falls back to defaults when the file is missing or invalid.
pub fn load_from(path: &Path) -> MentorConfigFile {
    if !path.exists() {
        return MentorConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                MentorConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            MentorConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/mentor-live/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("mentor-live").join("config.toml"))
}
