//! Session transport for the remote streaming endpoint
//!
//! Owns the lifecycle of at most one remote session. The connection itself
//! lives behind the [`Connector`] and [`SessionLink`] seams; lifecycle and
//! inbound messages come back as [`TransportEvent`](crate::events::TransportEvent)s
//! on the event queue.

pub mod live;
pub mod protocol;

use crate::events::{EventSender, SessionId};
use crate::voice::EncodedChunk;
use crate::{Error, Result};

pub use live::{DEFAULT_ENDPOINT, DEFAULT_MODEL, LiveConnector};
pub use protocol::{ClientMessage, Modality, ServerContent, ServerMessage};

use protocol::{
    Content, GenerationConfig, PrebuiltVoiceConfig, Setup, SpeechConfig, TranscriptionConfig,
    VoiceConfig,
};

/// Default synthesized voice
pub const DEFAULT_VOICE: &str = "Zephyr";

/// Fixed configuration passed through when a session opens
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model identifier, with or without the `models/` prefix
    pub model: String,
    /// Prebuilt voice name
    pub voice: String,
    /// Response modality
    pub modality: Modality,
    /// Request transcripts of the user's speech
    pub transcribe_input: bool,
    /// Request transcripts of the model's speech
    pub transcribe_output: bool,
    /// Persona system prompt
    pub system_instruction: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            modality: Modality::Audio,
            transcribe_input: true,
            transcribe_output: true,
            system_instruction: String::new(),
        }
    }
}

impl SessionConfig {
    /// Model name as the endpoint expects it
    #[must_use]
    pub fn qualified_model(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    /// Build the setup message sent first on every session
    #[must_use]
    pub fn setup_message(&self) -> ClientMessage {
        let transcription = |enabled: bool| enabled.then(TranscriptionConfig::default);
        let system_instruction = (!self.system_instruction.trim().is_empty())
            .then(|| Content::text(self.system_instruction.clone()));

        ClientMessage::Setup(Setup {
            model: self.qualified_model(),
            generation_config: GenerationConfig {
                response_modalities: vec![self.modality],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.voice.clone(),
                        },
                    },
                },
            },
            system_instruction,
            input_audio_transcription: transcription(self.transcribe_input),
            output_audio_transcription: transcription(self.transcribe_output),
        })
    }
}

/// Lifecycle of one session handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection requested, not yet accepting input
    Connecting,
    /// Accepting input
    Open,
    /// Closed gracefully or by the remote
    Closed,
    /// Failed to open or failed while open
    Failed,
}

/// Opens connections to the remote endpoint
pub trait Connector {
    /// Start connecting `session`, sending `setup` first
    ///
    /// Must return without waiting for the session to open. Progress is
    /// reported on `events`: `Opened` once input is accepted, then
    /// `Message`, `Error` and `Closed` as they happen.
    ///
    /// # Errors
    ///
    /// Returns error if the connection cannot even be attempted
    fn connect(
        &mut self,
        session: SessionId,
        setup: ClientMessage,
        events: EventSender,
    ) -> Result<Box<dyn SessionLink>>;
}

/// Handle to one live connection
pub trait SessionLink {
    /// Queue a message for sending
    ///
    /// # Errors
    ///
    /// Returns error if the connection is gone
    fn send(&mut self, message: ClientMessage) -> Result<()>;

    /// Tear down the connection; safe to call repeatedly
    fn close(&mut self);
}

struct ActiveSession {
    id: SessionId,
    state: SessionState,
    link: Box<dyn SessionLink>,
}

/// Owns at most one remote session
pub struct SessionTransport {
    connector: Box<dyn Connector>,
    config: SessionConfig,
    active: Option<ActiveSession>,
    chunks_sent: u64,
}

impl SessionTransport {
    /// Create a transport with no session
    #[must_use]
    pub fn new(connector: Box<dyn Connector>, config: SessionConfig) -> Self {
        Self {
            connector,
            config,
            active: None,
            chunks_sent: 0,
        }
    }

    /// Request a new session
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionActive` if a session is already connecting or
    /// open (the existing session is left untouched), or
    /// `Error::SessionOpen` if the connection cannot be attempted
    pub fn open(&mut self, session: SessionId, events: EventSender) -> Result<()> {
        if self.is_active() {
            return Err(Error::SessionActive);
        }
        self.close();

        let setup = self.config.setup_message();
        let link = self
            .connector
            .connect(session, setup, events)
            .map_err(|e| match e {
                Error::SessionOpen(_) => e,
                other => Error::SessionOpen(other.to_string()),
            })?;

        self.active = Some(ActiveSession {
            id: session,
            state: SessionState::Connecting,
            link,
        });
        self.chunks_sent = 0;

        tracing::debug!(session = %session, model = %self.config.qualified_model(), "session connecting");
        Ok(())
    }

    /// Record that `session` is ready for input; returns false for a stale id
    pub fn mark_open(&mut self, session: SessionId) -> bool {
        match &mut self.active {
            Some(active) if active.id == session && active.state == SessionState::Connecting => {
                active.state = SessionState::Open;
                tracing::info!(session = %session, "session open");
                true
            }
            _ => false,
        }
    }

    /// Record that `session` failed
    pub fn mark_failed(&mut self, session: SessionId) {
        if let Some(active) = &mut self.active
            && active.id == session
        {
            active.state = SessionState::Failed;
        }
    }

    /// Send one encoded chunk
    ///
    /// A no-op unless the session is open. Never fails: errors are logged
    /// and the chunk is dropped.
    pub fn send(&mut self, chunk: EncodedChunk) {
        let Some(active) = &mut self.active else {
            return;
        };
        if active.state != SessionState::Open {
            return;
        }

        match active.link.send(ClientMessage::audio(chunk)) {
            Ok(()) => self.chunks_sent += 1,
            Err(e) => tracing::debug!(session = %active.id, error = %e, "dropping audio chunk"),
        }
    }

    /// Close the current session, if any; safe to call repeatedly
    pub fn close(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.link.close();
            tracing::debug!(session = %active.id, chunks = self.chunks_sent, "session closed");
        }
    }

    /// State of the current session, if any
    #[must_use]
    pub fn state(&self) -> Option<SessionState> {
        self.active.as_ref().map(|a| a.state)
    }

    /// Id of the current session, if any
    #[must_use]
    pub fn current_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Whether a session is connecting or open
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            Some(SessionState::Connecting | SessionState::Open)
        )
    }

    /// Chunks sent on the current session
    #[must_use]
    pub const fn chunks_sent(&self) -> u64 {
        self.chunks_sent
    }

    /// Session configuration
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl Drop for SessionTransport {
    fn drop(&mut self) {
        self.close();
    }
}
