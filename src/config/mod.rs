//! Configuration management for the voice client

pub mod file;

use std::fmt;

use secrecy::SecretString;
use url::Url;

use crate::persona::Persona;
use crate::session::{DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_VOICE, Modality, SessionConfig};
use crate::voice::{DEFAULT_BLOCK_FRAMES, SAMPLE_RATE};
use crate::{Error, Result};

use file::ConfigFile;

/// Longest capture block accepted, in milliseconds
pub const MAX_BLOCK_MILLIS: usize = 100;

/// Voice client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Live endpoint configuration
    pub live: LiveConfig,

    /// Audio configuration
    pub audio: AudioConfig,

    /// Assistant persona
    pub persona: Persona,
}

/// Live endpoint configuration
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Websocket endpoint
    pub endpoint: Url,

    /// Model identifier
    pub model: String,

    /// Prebuilt voice name
    pub voice: String,

    /// Transcribe the user's speech
    pub transcribe_input: bool,

    /// Transcribe the assistant's speech
    pub transcribe_output: bool,

    /// API key (from `GEMINI_API_KEY` or `GOOGLE_API_KEY`)
    pub api_key: Option<SecretString>,
}

/// Audio configuration
#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    /// Frames per captured block at the capture rate
    pub block_frames: usize,
}

impl AudioConfig {
    /// Block duration in milliseconds
    #[must_use]
    pub fn block_millis(&self) -> usize {
        self.block_frames * 1000 / SAMPLE_RATE as usize
    }

    /// Whether one block holds more than `MAX_BLOCK_MILLIS` of audio
    #[must_use]
    pub fn exceeds_block_limit(&self) -> bool {
        self.block_frames * 1000 > MAX_BLOCK_MILLIS * SAMPLE_RATE as usize
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is not a URL or the block size is out
    /// of range
    pub fn from_sources(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let endpoint = env("RADHA_ENDPOINT")
            .or(fc.live.endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let endpoint = Url::parse(&endpoint)?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "endpoint must be a ws:// or wss:// url, got {endpoint}"
            )));
        }

        // API key comes only from the environment
        let api_key = env("GEMINI_API_KEY")
            .or_else(|| env("GOOGLE_API_KEY"))
            .map(SecretString::from);

        let live = LiveConfig {
            endpoint,
            model: env("RADHA_MODEL")
                .or(fc.live.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            voice: env("RADHA_VOICE")
                .or(fc.live.voice)
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            transcribe_input: fc.live.transcribe_input.unwrap_or(true),
            transcribe_output: fc.live.transcribe_output.unwrap_or(true),
            api_key,
        };

        let block_frames = match env("RADHA_BLOCK_FRAMES") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::Config(format!("RADHA_BLOCK_FRAMES must be a positive integer, got {raw}"))
            })?,
            None => fc.audio.block_frames.unwrap_or(DEFAULT_BLOCK_FRAMES),
        };
        let audio = AudioConfig { block_frames };

        let defaults = Persona::default();
        let persona = Persona {
            name: fc.persona.name.unwrap_or(defaults.name),
            system_instruction: fc
                .persona
                .system_instruction
                .unwrap_or(defaults.system_instruction),
            greeting: fc.persona.greeting.unwrap_or(defaults.greeting),
        };

        let config = Self {
            live,
            audio,
            persona,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.audio.block_frames == 0 {
            return Err(Error::Config("block_frames must be at least 1".to_string()));
        }
        if self.audio.exceeds_block_limit() {
            return Err(Error::Config(format!(
                "block_frames {} is {} ms at {SAMPLE_RATE} Hz, limit is {MAX_BLOCK_MILLIS} ms",
                self.audio.block_frames,
                self.audio.block_millis()
            )));
        }
        if self.live.model.trim().is_empty() {
            return Err(Error::Config("model must not be empty".to_string()));
        }
        if self.live.voice.trim().is_empty() {
            return Err(Error::Config("voice must not be empty".to_string()));
        }
        Ok(())
    }

    /// Session settings passed through when a session opens
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.live.model.clone(),
            voice: self.live.voice.clone(),
            modality: Modality::Audio,
            transcribe_input: self.live.transcribe_input,
            transcribe_output: self.live.transcribe_output,
            system_instruction: self
                .persona
                .system_prompt()
                .unwrap_or_default()
                .to_string(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.live.api_key.is_some() {
            "set"
        } else {
            "not set"
        };

        writeln!(f, "[live]")?;
        writeln!(f, "endpoint = \"{}\"", self.live.endpoint)?;
        writeln!(f, "model = \"{}\"", self.live.model)?;
        writeln!(f, "voice = \"{}\"", self.live.voice)?;
        writeln!(f, "transcribe_input = {}", self.live.transcribe_input)?;
        writeln!(f, "transcribe_output = {}", self.live.transcribe_output)?;
        writeln!(f, "# api key: {key}")?;
        writeln!(f)?;
        writeln!(f, "[audio]")?;
        writeln!(
            f,
            "block_frames = {}  # {} ms",
            self.audio.block_frames,
            self.audio.block_millis()
        )?;
        writeln!(f)?;
        writeln!(f, "[persona]")?;
        writeln!(f, "name = \"{}\"", self.persona.name)?;
        writeln!(f, "greeting = {:?}", self.persona.greeting)?;
        write!(
            f,
            "# system_instruction: {} chars",
            self.persona.system_instruction.chars().count()
        )
    }
}
