//! Shared test utilities
//!
//! Hand-written stand-ins for the microphone, the speakers and the live
//! connection. Each mock records what happened in an `Arc<Mutex<..>>` the
//! test keeps a handle to.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use base64::Engine as _;
use radha_voice::conversation::{Conversation, ConversationObserver, Status};
use radha_voice::events::{self, BufferId, Event, EventReceiver, EventSender, SessionId, TransportEvent};
use radha_voice::session::{ClientMessage, Connector, ServerMessage, SessionConfig, SessionLink, SessionTransport};
use radha_voice::transcript::ChatLine;
use radha_voice::voice::{AudioBuffer, AudioInput, AudioOutput, BlockSink, CapturePipeline, PlaybackScheduler};
use radha_voice::{Error, Result};

/// Block size used by the harness (10 ms at 16 kHz)
pub const TEST_BLOCK_FRAMES: usize = 160;

/// Greeting used by the harness
pub const TEST_GREETING: &str = "Hello there!";

/// Recorded microphone activity
#[derive(Default)]
pub struct InputState {
    pub deny: bool,
    pub fail_start: bool,
    pub acquires: u32,
    pub starts: u32,
    pub stops: u32,
    pub capturing: bool,
    pub sink: Option<BlockSink>,
}

/// Mock microphone
pub struct MockInput(pub Arc<Mutex<InputState>>);

impl AudioInput for MockInput {
    fn acquire(&mut self) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        if state.deny {
            return Err(Error::DeviceAccess("permission denied".to_string()));
        }
        state.acquires += 1;
        Ok(())
    }

    fn start(&mut self, sink: BlockSink) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        if state.fail_start {
            return Err(Error::Audio("input stream failed".to_string()));
        }
        state.starts += 1;
        state.capturing = true;
        state.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.0.lock().unwrap();
        state.stops += 1;
        state.capturing = false;
        state.sink = None;
    }

    fn is_capturing(&self) -> bool {
        self.0.lock().unwrap().capturing
    }
}

/// Recorded speaker activity
#[derive(Default)]
pub struct OutputState {
    pub fail_open: bool,
    pub open: bool,
    pub opens: u32,
    pub closes: u32,
    pub now: f64,
    /// (buffer, start time, frames)
    pub scheduled: Vec<(BufferId, f64, usize)>,
    pub halted: Vec<BufferId>,
}

/// Mock speakers with a manually driven clock
pub struct MockOutput(pub Arc<Mutex<OutputState>>);

impl AudioOutput for MockOutput {
    fn open(&mut self, _session: SessionId, _events: EventSender) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        if state.fail_open {
            return Err(Error::Audio("no output device available".to_string()));
        }
        state.open = true;
        state.opens += 1;
        state.now = 0.0;
        Ok(())
    }

    fn now(&self) -> f64 {
        self.0.lock().unwrap().now
    }

    fn schedule(&mut self, id: BufferId, start_at: f64, buffer: AudioBuffer) -> Result<f64> {
        self.0
            .lock()
            .unwrap()
            .scheduled
            .push((id, start_at, buffer.frames()));
        Ok(start_at)
    }

    fn halt(&mut self, id: BufferId) {
        self.0.lock().unwrap().halted.push(id);
    }

    fn close(&mut self) {
        let mut state = self.0.lock().unwrap();
        state.open = false;
        state.closes += 1;
    }

    fn is_open(&self) -> bool {
        self.0.lock().unwrap().open
    }
}

/// Recorded connection activity
#[derive(Default)]
pub struct LinkState {
    pub refuse: Option<String>,
    pub sessions: Vec<SessionId>,
    pub setups: Vec<serde_json::Value>,
    pub sent: Vec<serde_json::Value>,
    pub closes: u32,
}

impl LinkState {
    /// Base64 payloads of every audio chunk sent, in order
    pub fn sent_audio(&self) -> Vec<String> {
        self.sent
            .iter()
            .filter_map(|m| m["realtimeInput"]["mediaChunks"][0]["data"].as_str())
            .map(ToString::to_string)
            .collect()
    }
}

/// Mock connector; sessions never open on their own
pub struct MockConnector(pub Arc<Mutex<LinkState>>);

/// Mock connection handle
pub struct MockLink(pub Arc<Mutex<LinkState>>);

impl Connector for MockConnector {
    fn connect(
        &mut self,
        session: SessionId,
        setup: ClientMessage,
        _events: EventSender,
    ) -> Result<Box<dyn SessionLink>> {
        let mut state = self.0.lock().unwrap();
        if let Some(reason) = &state.refuse {
            return Err(Error::SessionOpen(reason.clone()));
        }
        state.sessions.push(session);
        state.setups.push(serde_json::to_value(&setup).unwrap());
        Ok(Box::new(MockLink(Arc::clone(&self.0))))
    }
}

impl SessionLink for MockLink {
    fn send(&mut self, message: ClientMessage) -> Result<()> {
        self.0
            .lock()
            .unwrap()
            .sent
            .push(serde_json::to_value(&message).unwrap());
        Ok(())
    }

    fn close(&mut self) {
        self.0.lock().unwrap().closes += 1;
    }
}

/// Everything the observer was told
#[derive(Default)]
pub struct ObserverLog {
    pub lines: Vec<ChatLine>,
    pub statuses: Vec<(Status, Option<String>)>,
}

/// Observer recording lines and status changes
pub struct RecordingObserver(pub Arc<Mutex<ObserverLog>>);

impl ConversationObserver for RecordingObserver {
    fn line_appended(&mut self, line: &ChatLine) {
        self.0.lock().unwrap().lines.push(line.clone());
    }

    fn status_changed(&mut self, status: Status, error: Option<&str>) {
        self.0
            .lock()
            .unwrap()
            .statuses
            .push((status, error.map(ToString::to_string)));
    }
}

/// A conversation wired to mocks
pub struct Harness {
    pub conversation: Conversation,
    pub events: EventSender,
    pub rx: EventReceiver,
    pub input: Arc<Mutex<InputState>>,
    pub output: Arc<Mutex<OutputState>>,
    pub link: Arc<Mutex<LinkState>>,
    pub observer: Arc<Mutex<ObserverLog>>,
}

/// Build a conversation on mock devices and a mock connector
pub fn harness() -> Harness {
    let input = Arc::new(Mutex::new(InputState::default()));
    let output = Arc::new(Mutex::new(OutputState::default()));
    let link = Arc::new(Mutex::new(LinkState::default()));
    let observer = Arc::new(Mutex::new(ObserverLog::default()));
    let (events, rx) = events::channel();

    let conversation = Conversation::new(
        CapturePipeline::new(Box::new(MockInput(Arc::clone(&input))), TEST_BLOCK_FRAMES),
        SessionTransport::new(
            Box::new(MockConnector(Arc::clone(&link))),
            SessionConfig {
                system_instruction: "Be kind.".to_string(),
                ..SessionConfig::default()
            },
        ),
        PlaybackScheduler::new(Box::new(MockOutput(Arc::clone(&output)))),
        Box::new(RecordingObserver(Arc::clone(&observer))),
        events.clone(),
        TEST_GREETING,
    );

    Harness {
        conversation,
        events,
        rx,
        input,
        output,
        link,
        observer,
    }
}

impl Harness {
    /// Handle every queued event
    pub fn drain(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            let _ = self.conversation.handle(event);
        }
    }

    /// Current session id
    pub fn session(&self) -> SessionId {
        self.conversation.session_id().expect("no session in progress")
    }

    /// Deliver a transport event for `session`
    pub fn transport_event(&mut self, session: SessionId, event: TransportEvent) {
        events::post(&self.events, Event::Transport { session, event });
        self.drain();
    }

    /// Deliver a server message for the current session
    pub fn server_message(&mut self, value: serde_json::Value) {
        let message: ServerMessage = serde_json::from_value(value).unwrap();
        let session = self.session();
        self.transport_event(session, TransportEvent::Message(Box::new(message)));
    }

    /// Start a conversation and complete the open handshake
    pub fn open(&mut self) -> SessionId {
        self.conversation.start().unwrap();
        let session = self.session();
        self.transport_event(session, TransportEvent::Opened);
        session
    }

    /// Feed samples through the microphone's sink
    pub fn speak(&mut self, samples: &[f32]) {
        self.input
            .lock()
            .unwrap()
            .sink
            .as_mut()
            .expect("microphone is not capturing")
            .push(samples);
        self.drain();
    }
}

/// Base64 of `frames` frames of 16-bit silence
pub fn silence_payload(frames: usize) -> String {
    base64::engine::general_purpose::STANDARD.encode(vec![0u8; frames * 2])
}
