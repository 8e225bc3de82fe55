//! Radha Voice - real-time voice conversations with a live AI model
//!
//! This library provides the streaming core of the voice client:
//! - PCM codec and microphone capture
//! - Session transport for the live websocket endpoint
//! - Gapless playback scheduling on the output clock
//! - Transcript assembly and the conversation dispatcher
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  CaptureBlock   ┌──────────────────────────────┐
//! │  Microphone  │ ──────────────▶ │                              │
//! └──────────────┘                 │                              │
//! ┌──────────────┐  Transport      │     Conversation (events)    │
//! │ Live session │ ──────────────▶ │  capture · transport ·       │
//! └──────────────┘                 │  playback · transcript       │
//! ┌──────────────┐  PlaybackEnded  │                              │
//! │   Speakers   │ ──────────────▶ │                              │
//! └──────────────┘                 └──────────────────────────────┘
//! ```

pub mod config;
pub mod conversation;
pub mod daemon;
pub mod error;
pub mod events;
pub mod persona;
pub mod session;
pub mod transcript;
pub mod voice;

pub use config::Config;
pub use conversation::{Conversation, ConversationObserver, Phase, Status};
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use events::{Event, SessionId, TransportEvent};
pub use persona::Persona;
pub use session::{SessionConfig, SessionTransport};
pub use transcript::{ChatLine, Speaker, Transcript, TranscriptTurn};
