//! TOML configuration file loading
//!
//! Supports `~/.config/radha/config.toml` as a persistent config source
//! (`RADHA_CONFIG` points elsewhere). Every field is optional and the file
//! is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Live endpoint configuration
    #[serde(default)]
    pub live: LiveFileConfig,

    /// Audio configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Persona overrides
    #[serde(default)]
    pub persona: PersonaFileConfig,
}

/// Live endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct LiveFileConfig {
    /// Websocket endpoint URL
    pub endpoint: Option<String>,

    /// Model identifier (e.g. "gemini-2.5-flash-native-audio-preview-09-2025")
    pub model: Option<String>,

    /// Prebuilt voice name (e.g. "Zephyr")
    pub voice: Option<String>,

    /// Transcribe the user's speech
    pub transcribe_input: Option<bool>,

    /// Transcribe the assistant's speech
    pub transcribe_output: Option<bool>,
}

/// Audio configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Frames per captured block
    pub block_frames: Option<usize>,
}

/// Persona overrides
#[derive(Debug, Default, Deserialize)]
pub struct PersonaFileConfig {
    pub name: Option<String>,
    pub system_instruction: Option<String>,
    pub greeting: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    config_file_path().map_or_else(ConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from `path`
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
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
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `RADHA_CONFIG` or `~/.config/radha/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("RADHA_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("radha").join("config.toml"))
}
