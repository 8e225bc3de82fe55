//! Inbound event queue for the conversation dispatcher
//!
//! Device callbacks, the transport task, and the terminal all post into one
//! unbounded channel. The dispatcher drains it one event at a time, so no
//! component state is ever touched concurrently.

use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::session::ServerMessage;

/// Identifier of one playback buffer on the output clock
pub type BufferId = u64;

/// Identifier of one session attempt
///
/// Every event produced on behalf of a session carries its id; events for a
/// session that is no longer current are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh session id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle and data events emitted by the session transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Session is ready to accept input
    Opened,
    /// One inbound server message
    Message(Box<ServerMessage>),
    /// Transport-level failure
    Error(String),
    /// Graceful or remote-initiated close
    Closed { reason: Option<String> },
}

/// Everything the dispatcher reacts to
#[derive(Debug, Clone)]
pub enum Event {
    /// User pressed the conversation toggle
    Toggle,
    /// Process is shutting down
    Shutdown,
    /// One fixed-size block of captured microphone samples
    CaptureBlock { session: SessionId, samples: Vec<f32> },
    /// Something happened on the session transport
    Transport {
        session: SessionId,
        event: TransportEvent,
    },
    /// A scheduled playback buffer finished naturally
    PlaybackEnded { session: SessionId, buffer: BufferId },
}

/// Sending half of the event queue
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Receiving half of the event queue
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Create the event queue
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Post an event, ignoring a closed queue
///
/// Used from device callbacks and background tasks, which must never fail
/// because the dispatcher has already gone away.
pub fn post(events: &EventSender, event: Event) {
    if events.send(event).is_err() {
        tracing::trace!("event queue closed, dropping event");
    }
}
