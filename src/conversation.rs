//! Conversation dispatcher
//!
//! Drives the session lifecycle from one event queue. Every event is handled
//! to completion before the next is taken, so the capture pipeline, the
//! transport, the playback scheduler and the transcript are only ever
//! touched from here.
//!
//! ```text
//! Idle -> Connecting -> Open -> (Closing) -> Idle
//!              \           \
//!               -> Failed --+-> Idle
//! ```

use std::fmt;
use std::ops::ControlFlow;

use crate::events::{Event, EventReceiver, EventSender, SessionId, TransportEvent};
use crate::session::{ServerMessage, SessionTransport};
use crate::transcript::{ChatLine, Transcript};
use crate::voice::{CapturePipeline, PlaybackScheduler};
use crate::{Error, Result};

/// Shown when a transport error ends an open session
pub const CONNECTION_ERROR_MESSAGE: &str = "An error occurred with the connection.";

/// Prefix of the message shown when a start attempt fails
pub const START_FAILED_PREFIX: &str = "Failed to start conversation.";

/// Connection status as seen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Connecting,
    Active,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// Internal lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Open,
    Closing,
    Failed,
}

impl Phase {
    const fn status(self) -> Status {
        match self {
            Self::Connecting => Status::Connecting,
            Self::Open => Status::Active,
            Self::Idle | Self::Closing | Self::Failed => Status::Idle,
        }
    }
}

/// Consumer of transcript lines and status changes
pub trait ConversationObserver {
    /// A finished line was appended to the transcript
    fn line_appended(&mut self, line: &ChatLine);

    /// Status changed; `error` holds the current user-visible error, if any
    fn status_changed(&mut self, status: Status, error: Option<&str>);
}

/// Owns every component of one conversation and reacts to events
pub struct Conversation {
    capture: CapturePipeline,
    transport: SessionTransport,
    playback: PlaybackScheduler,
    transcript: Transcript,
    observer: Box<dyn ConversationObserver>,
    events: EventSender,
    phase: Phase,
    session: Option<SessionId>,
    error: Option<String>,
}

impl Conversation {
    /// Assemble a conversation; `greeting` seeds the transcript when non-empty
    #[must_use]
    pub fn new(
        capture: CapturePipeline,
        transport: SessionTransport,
        playback: PlaybackScheduler,
        mut observer: Box<dyn ConversationObserver>,
        events: EventSender,
        greeting: &str,
    ) -> Self {
        let transcript = Transcript::with_greeting(greeting);
        for line in transcript.lines() {
            observer.line_appended(line);
        }

        Self {
            capture,
            transport,
            playback,
            transcript,
            observer,
            events,
            phase: Phase::Idle,
            session: None,
            error: None,
        }
    }

    /// Start when idle, otherwise tear down
    pub fn toggle_conversation(&mut self) {
        if self.phase == Phase::Idle {
            // failures are already reported through the error slot
            let _ = self.start();
        } else {
            self.stop();
        }
    }

    /// Begin a new session: acquire the microphone, then request the session
    ///
    /// Capture starts only once the session reports it is open.
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionActive` unless idle (nothing is disturbed),
    /// `Error::DeviceAccess` if the microphone is unavailable, or
    /// `Error::SessionOpen` if the session cannot be requested. Failures
    /// also land in the error slot and leave the conversation idle.
    pub fn start(&mut self) -> Result<()> {
        if self.phase != Phase::Idle {
            return Err(Error::SessionActive);
        }

        let session = SessionId::new();
        self.error = None;
        self.session = Some(session);
        self.set_phase(Phase::Connecting);
        tracing::info!(session = %session, "starting conversation");

        if let Err(e) = self.capture.acquire() {
            self.fail_start(&e);
            return Err(e);
        }

        if let Err(e) = self.transport.open(session, self.events.clone()) {
            self.fail_start(&e);
            return Err(e);
        }

        Ok(())
    }

    /// Tear everything down and return to idle; a no-op when already idle
    pub fn stop(&mut self) {
        if self.phase == Phase::Idle {
            return;
        }

        if let Some(session) = self.session {
            tracing::info!(session = %session, "stopping conversation");
        }
        self.phase = Phase::Closing;
        self.teardown();
        self.set_phase(Phase::Idle);
    }

    /// Handle one event; breaks on shutdown
    pub fn handle(&mut self, event: Event) -> ControlFlow<()> {
        match event {
            Event::Toggle => self.toggle_conversation(),
            Event::Shutdown => {
                self.stop();
                return ControlFlow::Break(());
            }
            Event::CaptureBlock { session, samples } => {
                if self.is_current(session) && self.phase == Phase::Open {
                    let chunk = self.capture.encode_block(&samples);
                    self.transport.send(chunk);
                }
            }
            Event::Transport { session, event } => {
                if self.is_current(session) {
                    self.on_transport_event(session, event);
                } else {
                    tracing::trace!(session = %session, "ignoring event for stale session");
                }
            }
            Event::PlaybackEnded { session, buffer } => {
                if self.is_current(session) {
                    self.playback.on_ended(buffer);
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Process events until shutdown
    pub async fn run(&mut self, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            if self.handle(event).is_break() {
                break;
            }
        }
        self.stop();
    }

    /// User-visible status
    #[must_use]
    pub const fn status(&self) -> Status {
        self.phase.status()
    }

    /// Internal lifecycle phase
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Current user-visible error, if any
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Finished transcript lines
    #[must_use]
    pub fn transcript(&self) -> &[ChatLine] {
        self.transcript.lines()
    }

    /// Id of the session in progress, if any
    #[must_use]
    pub const fn session_id(&self) -> Option<SessionId> {
        self.session
    }

    /// Capture pipeline
    #[must_use]
    pub const fn capture(&self) -> &CapturePipeline {
        &self.capture
    }

    /// Session transport
    #[must_use]
    pub const fn transport(&self) -> &SessionTransport {
        &self.transport
    }

    /// Playback scheduler
    #[must_use]
    pub const fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    fn is_current(&self, session: SessionId) -> bool {
        self.session == Some(session)
    }

    fn on_transport_event(&mut self, session: SessionId, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_opened(session),
            TransportEvent::Message(message) => {
                if self.phase == Phase::Open {
                    self.on_message(&message);
                }
            }
            TransportEvent::Error(detail) => {
                if self.phase == Phase::Connecting {
                    self.fail_start(&Error::SessionOpen(detail));
                } else {
                    self.fail_connection(&detail);
                }
            }
            TransportEvent::Closed { reason } => {
                if self.phase == Phase::Connecting {
                    let detail =
                        reason.unwrap_or_else(|| "session closed before it opened".to_string());
                    self.fail_start(&Error::SessionOpen(detail));
                } else {
                    tracing::info!(session = %session, reason = ?reason, "session closed");
                    self.stop();
                }
            }
        }
    }

    /// Second phase of start: output clock first, then the microphone
    fn on_opened(&mut self, session: SessionId) {
        if self.phase != Phase::Connecting || !self.transport.mark_open(session) {
            return;
        }

        let wired = self
            .playback
            .begin(session, self.events.clone())
            .and_then(|()| self.capture.start(session, self.events.clone()));

        match wired {
            Ok(()) => self.set_phase(Phase::Open),
            Err(e) => self.fail_start(&e),
        }
    }

    fn on_message(&mut self, message: &ServerMessage) {
        if let Some(go_away) = &message.go_away {
            tracing::warn!(time_left = ?go_away.time_left, "server will end the session soon");
        }

        let Some(content) = &message.server_content else {
            return;
        };

        let turn = self.transcript.turn_mut();
        if let Some(text) = content.output_text() {
            turn.push_assistant(text);
        }
        if let Some(text) = content.input_text() {
            turn.push_user(text);
        }

        if content.is_turn_complete() {
            for line in self.transcript.complete_turn() {
                tracing::debug!(speaker = %line.speaker, "transcript line");
                self.observer.line_appended(line);
            }
        }

        if content.is_interrupted() {
            tracing::debug!("assistant interrupted, dropping queued speech");
            self.playback.interrupt();
        }

        for payload in content.audio_payloads() {
            match self.playback.enqueue(payload) {
                Ok(_) => {}
                Err(Error::Decode(e)) => {
                    tracing::warn!(error = %e, "dropping malformed audio chunk");
                }
                Err(e) => tracing::warn!(error = %e, "failed to schedule audio chunk"),
            }
        }
    }

    fn fail_start(&mut self, err: &Error) {
        let detail = match err {
            Error::DeviceAccess(msg) | Error::SessionOpen(msg) => msg.clone(),
            other => other.to_string(),
        };
        tracing::warn!(error = %err, "conversation failed to start");

        self.error = Some(format!("{START_FAILED_PREFIX} {detail}"));
        self.phase = Phase::Failed;
        self.teardown();
        self.set_phase(Phase::Idle);
    }

    fn fail_connection(&mut self, detail: &str) {
        tracing::error!(error = %detail, "connection error");
        if let Some(session) = self.session {
            self.transport.mark_failed(session);
        }

        self.error = Some(CONNECTION_ERROR_MESSAGE.to_string());
        self.phase = Phase::Failed;
        self.teardown();
        self.set_phase(Phase::Idle);
    }

    /// Release every resource of the current session; safe to repeat
    fn teardown(&mut self) {
        self.capture.stop();
        self.playback.close();
        self.transport.close();
        self.transcript.turn_mut().clear();
        self.session = None;
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        let status = phase.status();
        tracing::debug!(status = %status, "status changed");
        self.observer.status_changed(status, self.error.as_deref());
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        self.teardown();
    }
}
