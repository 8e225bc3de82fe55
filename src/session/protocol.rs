//! Wire messages for the live streaming endpoint
//!
//! JSON with camelCase field names. The client sends one `setup` message and
//! then a stream of `realtimeInput` messages; the server answers with
//! `setupComplete` followed by `serverContent` events.

use serde::{Deserialize, Serialize};

use crate::voice::EncodedChunk;

/// Message sent from client to server
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// First message of every session
    Setup(Setup),
    /// Streaming microphone input
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    /// Wrap one encoded audio chunk as realtime input
    #[must_use]
    pub fn audio(chunk: EncodedChunk) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![chunk],
        })
    }
}

/// Session configuration sent once at open
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Fully qualified model name, e.g. `models/gemini-...`
    pub model: String,
    /// Generation settings
    pub generation_config: GenerationConfig,
    /// Persona prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    /// Request transcripts of the user's speech
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionConfig>,
    /// Request transcripts of the model's speech
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<TranscriptionConfig>,
}

/// Generation settings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Modalities the model answers in
    pub response_modalities: Vec<Modality>,
    /// Voice used for synthesized speech
    pub speech_config: SpeechConfig,
}

/// Response modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Modality {
    Audio,
    Text,
}

/// Speech synthesis settings
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

/// Voice selection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

/// Named voice preset
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Empty object enabling transcription
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranscriptionConfig {}

/// Streaming input payload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<EncodedChunk>,
}

/// Content made of parts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Single text part
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part {
                text: Some(text.into()),
                inline_data: None,
            }],
        }
    }
}

/// One part of a content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

/// Inline binary payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Base64 payload
    pub data: String,
}

/// Message received from the server
///
/// Every field is optional; unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// Present once the session accepts input
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    /// Transcripts, audio and turn signals
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    /// Server is about to disconnect
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

impl ServerMessage {
    /// Whether this message completes session setup
    #[must_use]
    pub const fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }
}

/// Content of one server event
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    /// Fragment of the user's transcribed speech
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    /// Fragment of the model's transcribed speech
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    /// The model finished its turn
    #[serde(default)]
    pub turn_complete: Option<bool>,
    /// The user interrupted the model
    #[serde(default)]
    pub interrupted: Option<bool>,
    /// Model output parts, audio arrives as inline data
    #[serde(default)]
    pub model_turn: Option<Content>,
}

impl ServerContent {
    /// User transcript fragment, if any
    #[must_use]
    pub fn input_text(&self) -> Option<&str> {
        self.input_transcription.as_ref()?.text.as_deref()
    }

    /// Model transcript fragment, if any
    #[must_use]
    pub fn output_text(&self) -> Option<&str> {
        self.output_transcription.as_ref()?.text.as_deref()
    }

    /// Whether the turn is complete
    #[must_use]
    pub fn is_turn_complete(&self) -> bool {
        self.turn_complete.unwrap_or(false)
    }

    /// Whether the model was interrupted
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.unwrap_or(false)
    }

    /// Base64 audio payloads of the model turn, in order
    pub fn audio_payloads(&self) -> impl Iterator<Item = &str> {
        self.model_turn
            .iter()
            .flat_map(|turn| turn.parts.iter())
            .filter_map(|part| part.inline_data.as_ref())
            .map(|inline| inline.data.as_str())
    }
}

/// Transcript fragment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

/// Disconnect notice
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}
