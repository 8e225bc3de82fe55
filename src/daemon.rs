//! Daemon - the interactive voice client
//!
//! Wires the microphone, the speakers and the live connection into one
//! conversation, and feeds it keyboard toggles and shutdown signals.

use std::io::BufRead;

use crate::conversation::{Conversation, ConversationObserver, Status};
use crate::events::{self, Event, EventSender};
use crate::session::{LiveConnector, SessionTransport};
use crate::transcript::{ChatLine, Speaker};
use crate::voice::{CapturePipeline, CpalInput, CpalOutput, PlaybackScheduler};
use crate::{Config, Result};

/// The voice client daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Build a conversation on the default audio devices
    #[must_use]
    pub fn conversation(&self, events: EventSender) -> Conversation {
        let capture = CapturePipeline::new(Box::new(CpalInput::new()), self.config.audio.block_frames);
        let playback = PlaybackScheduler::new(Box::new(CpalOutput::new()));
        let connector = LiveConnector::new(
            self.config.live.endpoint.clone(),
            self.config.live.api_key.clone(),
        );
        let transport = SessionTransport::new(Box::new(connector), self.config.session_config());
        let observer = TerminalObserver::new(self.config.persona.name());

        Conversation::new(
            capture,
            transport,
            playback,
            Box::new(observer),
            events,
            self.config.persona.greeting().unwrap_or_default(),
        )
    }

    /// Run until the user quits or the process is interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the daemon cannot be started
    #[allow(clippy::future_not_send)]
    pub async fn run(self, start: bool) -> Result<()> {
        let (events_tx, events_rx) = events::channel();
        let mut conversation = self.conversation(events_tx.clone());

        // Set up shutdown signal
        let shutdown_tx = events_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                events::post(&shutdown_tx, Event::Shutdown);
            }
        });

        spawn_keyboard(events_tx.clone())?;

        println!("Press Enter to start or stop the conversation, q then Enter to quit.");
        if start {
            events::post(&events_tx, Event::Toggle);
        }

        conversation.run(events_rx).await;
        tracing::info!("voice client stopped");
        Ok(())
    }
}

/// Read keyboard commands on a dedicated thread
///
/// Blocking stdin reads would otherwise hold the runtime open at exit.
fn spawn_keyboard(events: EventSender) -> Result<()> {
    std::thread::Builder::new()
        .name("keyboard".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match line.trim() {
                    "q" | "quit" | "exit" => break,
                    _ => events::post(&events, Event::Toggle),
                }
            }
            events::post(&events, Event::Shutdown);
        })?;
    Ok(())
}

/// Prints the transcript and status to the terminal
pub struct TerminalObserver {
    assistant_name: String,
}

impl TerminalObserver {
    #[must_use]
    pub fn new(assistant_name: &str) -> Self {
        Self {
            assistant_name: assistant_name.to_string(),
        }
    }

    fn label(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::User => "You",
            Speaker::Assistant => &self.assistant_name,
        }
    }
}

impl ConversationObserver for TerminalObserver {
    fn line_appended(&mut self, line: &ChatLine) {
        println!("{}: {}", self.label(line.speaker), line.text);
    }

    fn status_changed(&mut self, status: Status, error: Option<&str>) {
        match status {
            Status::Connecting => println!("[connecting...]"),
            Status::Active => println!("[listening - press Enter to stop]"),
            Status::Idle => {
                if let Some(error) = error {
                    println!("[error] {error}");
                }
                println!("[idle - press Enter to talk]");
            }
        }
    }
}
