//! Websocket connection to the Gemini Live endpoint

use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::protocol::{ClientMessage, ServerMessage};
use super::{Connector, SessionLink};
use crate::events::{self, Event, EventSender, SessionId, TransportEvent};
use crate::{Error, Result};

/// Default bidirectional streaming endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default native-audio model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Message shown when no API key is configured
pub const MISSING_KEY_MESSAGE: &str = "GEMINI_API_KEY environment variable not set";

/// Opens websocket sessions against the live endpoint
pub struct LiveConnector {
    endpoint: Url,
    api_key: Option<SecretString>,
}

impl LiveConnector {
    /// Create a connector for `endpoint`
    ///
    /// A missing key is reported when a session is opened, not here.
    #[must_use]
    pub const fn new(endpoint: Url, api_key: Option<SecretString>) -> Self {
        Self { endpoint, api_key }
    }

    /// Endpoint URL with the API key attached
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionOpen` if no API key is configured
    pub fn request_url(&self) -> Result<Url> {
        let key = self
            .api_key
            .as_ref()
            .filter(|k| !k.expose_secret().trim().is_empty())
            .ok_or_else(|| Error::SessionOpen(MISSING_KEY_MESSAGE.to_string()))?;

        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("key", key.expose_secret());
        Ok(url)
    }
}

impl Connector for LiveConnector {
    fn connect(
        &mut self,
        session: SessionId,
        setup: ClientMessage,
        events: EventSender,
    ) -> Result<Box<dyn SessionLink>> {
        let url = self.request_url()?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        tracing::debug!(session = %session, endpoint = %self.endpoint, "connecting to live endpoint");
        let task = tokio::spawn(drive(url, session, setup, outbound_rx, events));

        Ok(Box::new(LiveLink {
            outbound: outbound_tx,
            task,
        }))
    }
}

/// Handle to a running websocket task
pub struct LiveLink {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    task: JoinHandle<()>,
}

impl SessionLink for LiveLink {
    fn send(&mut self, message: ClientMessage) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| Error::Transport("connection task has stopped".to_string()))
    }

    fn close(&mut self) {
        self.task.abort();
    }
}

impl Drop for LiveLink {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run one connection and report how it ended
async fn drive(
    url: Url,
    session: SessionId,
    setup: ClientMessage,
    outbound: mpsc::UnboundedReceiver<ClientMessage>,
    events: EventSender,
) {
    let event = match run_connection(url, session, setup, outbound, &events).await {
        Ok(reason) => TransportEvent::Closed { reason },
        Err(e) => {
            tracing::error!(session = %session, error = %e, "live connection failed");
            TransportEvent::Error(e.to_string())
        }
    };
    events::post(&events, Event::Transport { session, event });
}

async fn run_connection(
    url: Url,
    session: SessionId,
    setup: ClientMessage,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    events: &EventSender,
) -> Result<Option<String>> {
    let (socket, _) = connect_async(url.as_str()).await?;
    let (mut sink, mut stream) = socket.split();

    sink.send(Message::Text(serde_json::to_string(&setup)?)).await?;

    let mut opened = false;
    loop {
        tokio::select! {
            outgoing = outbound.recv(), if opened => {
                let Some(message) = outgoing else {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(None);
                };
                sink.send(Message::Text(serde_json::to_string(&message)?)).await?;
            }
            incoming = stream.next() => {
                let frame = match incoming {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(None),
                };

                let text = match frame {
                    Message::Text(text) => text,
                    Message::Binary(bytes) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            tracing::warn!(session = %session, "ignoring non-utf8 binary frame");
                            continue;
                        }
                    },
                    Message::Close(frame) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                        tracing::debug!(session = %session, reason = ?reason, "server closed session");
                        return Ok(reason);
                    }
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                };

                let message: ServerMessage = match serde_json::from_str(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!(session = %session, error = %e, "ignoring unparseable server message");
                        continue;
                    }
                };

                let event = if message.is_setup_complete() && !opened {
                    opened = true;
                    TransportEvent::Opened
                } else {
                    TransportEvent::Message(Box::new(message))
                };
                events::post(events, Event::Transport { session, event });
            }
        }
    }
}
