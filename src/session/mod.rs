// Chat session management.
// Owns the single WebSocket connection to the chat server: connect/disconnect
// lifecycle, serialized outbound sends, and the typed event stream consumed
// by the conversation UI.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex as TokioMutex};
use tokio::time::timeout;
use tokio_stream::wrappers::BroadcastStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::SessionError;
use crate::models::{ChatMessage, ConnectionStatus, Credentials, DeliveryStatus, Presence};

pub mod delivery;
pub mod protocol;

pub use delivery::DeliveryTracker;
use protocol::{InboundFrame, OutboundFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// How long to wait for the server's `ws_ready` frame after the socket opens.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the broadcast channel behind the event stream.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Typed events fanned out to session subscribers, in transport order.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    NewMessage(ChatMessage),
    MessageSentAck { local_id: String },
    DeliveryAck { local_id: String },
    DeliveryFailed { local_id: String },
}

struct ActiveConnection {
    sink: WsSink,
    reader: tokio::task::JoinHandle<()>,
}

/// Holds the state lock for the duration of a connect attempt.
///
/// `connect` awaits the transport while the status reads `Connecting`; if the
/// caller drops the future mid-handshake, no exit path runs and the status
/// would stay `Connecting` with nothing in flight. The guard rolls it back to
/// `Disconnected` unless the attempt already settled on `Connected` or
/// `Failed`.
struct ConnectAttempt<'a> {
    state: tokio::sync::MutexGuard<'a, SessionState>,
}

impl std::ops::Deref for ConnectAttempt<'_> {
    type Target = SessionState;

    fn deref(&self) -> &SessionState {
        &self.state
    }
}

impl std::ops::DerefMut for ConnectAttempt<'_> {
    fn deref_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if self.state.status == ConnectionStatus::Connecting {
            self.state.status = ConnectionStatus::Disconnected;
        }
    }
}

struct SessionState {
    status: ConnectionStatus,
    credentials: Option<Credentials>,
    presence: Presence,
    connection: Option<ActiveConnection>,
    // Bumped on every disconnect so a finished reader task can tell whether
    // the connection it served is still the live one.
    generation: u64,
}

/// Manages at most one live chat connection per instance.
///
/// All sends and lifecycle changes serialize through the internal state lock,
/// so a send can never slip onto a socket after a close has been initiated.
/// The session is an explicitly owned object: consumers receive it by
/// reference or handle, there is no process-wide singleton.
pub struct SessionManager {
    endpoint: String,
    state: Arc<TokioMutex<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Create a manager for the given endpoint, e.g. `ws://chat.example.com`.
    pub fn new(endpoint: &str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        SessionManager {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            state: Arc::new(TokioMutex::new(SessionState {
                status: ConnectionStatus::Disconnected,
                credentials: None,
                presence: Presence::Offline,
                connection: None,
                generation: 0,
            })),
            events,
        }
    }

    /// Establish the chat connection and wait for the server readiness signal.
    ///
    /// Idempotent: when a live connection already exists this returns
    /// immediately without a second handshake. Dropping the returned future
    /// mid-handshake closes the in-flight socket and reverts the status to
    /// disconnected; no partial connection is retained.
    pub async fn connect(&self, credentials: Credentials) -> Result<(), SessionError> {
        let mut state = ConnectAttempt {
            state: self.state.lock().await,
        };
        if state.connection.is_some() {
            debug!("connect: already connected, skipping handshake");
            return Ok(());
        }

        state.status = ConnectionStatus::Connecting;
        let url = format!(
            "{}/?token={}&gmail={}",
            self.endpoint, credentials.token, credentials.account_id
        );
        info!("Connecting to chat server as {}", credentials.account_id);

        let (ws, _) = match connect_async(&url).await {
            Ok(ok) => ok,
            Err(e) => {
                error!("WebSocket connect failed: {}", e);
                state.status = ConnectionStatus::Failed;
                return Err(SessionError::Connection(e.into()));
            }
        };
        let (sink, mut source) = ws.split();

        // The socket is open but the session is not usable until the server
        // says so. A close or error while waiting fails the whole connect.
        match timeout(HANDSHAKE_TIMEOUT, wait_for_ready(&mut source)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Handshake failed: {}", e);
                state.status = ConnectionStatus::Failed;
                return Err(SessionError::Connection(e));
            }
            Err(_) => {
                error!("Timed out waiting for ws_ready after {:?}", HANDSHAKE_TIMEOUT);
                state.status = ConnectionStatus::Failed;
                return Err(SessionError::Connection(anyhow!(
                    "no readiness signal within {:?}",
                    HANDSHAKE_TIMEOUT
                )));
            }
        }

        let generation = state.generation;
        let reader = tokio::spawn(read_loop(
            source,
            credentials.account_id.clone(),
            self.events.clone(),
            Arc::clone(&self.state),
            generation,
        ));

        state.connection = Some(ActiveConnection { sink, reader });
        state.credentials = Some(credentials);
        state.status = ConnectionStatus::Connected;
        info!("Chat session established");
        Ok(())
    }

    /// Send a chat message. Best-effort by design: when no connection is
    /// live the frame is dropped with a log line and no error is raised.
    pub async fn send_message(&self, recipient: &str, text: &str, local_id: &str) {
        let frame = OutboundFrame::Message {
            to: recipient.to_string(),
            text: text.to_string(),
            local_id: local_id.to_string(),
        };
        self.try_send(frame).await;
    }

    /// Broadcast an online/offline presence status. Fire-and-forget.
    pub async fn send_presence(&self, presence: Presence) {
        {
            let mut state = self.state.lock().await;
            state.presence = presence;
        }
        let frame = OutboundFrame::Presence {
            status: presence.as_str().to_string(),
        };
        self.try_send(frame).await;
    }

    /// Tell the server which conversation is now open on this device.
    pub async fn send_chat_open(&self, with: &str) {
        let frame = OutboundFrame::ChatOpen {
            with: with.to_string(),
        };
        self.try_send(frame).await;
    }

    /// Close the transport and clear session state. With `force_stop` the
    /// graceful close negotiation is skipped and the socket is torn down.
    pub async fn disconnect(&self, force_stop: bool) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.status = ConnectionStatus::Disconnected;
        state.credentials = None;
        state.presence = Presence::Offline;
        let Some(mut conn) = state.connection.take() else {
            debug!("disconnect: no active connection");
            return;
        };
        if force_stop {
            conn.reader.abort();
            info!("Chat session force-stopped");
            return;
        }
        if let Err(e) = conn.sink.send(WsMessage::Close(None)).await {
            warn!("Failed to send close frame: {}", e);
        }
        if let Err(e) = conn.sink.close().await {
            warn!("Failed to close chat socket: {}", e);
        }
        conn.reader.abort();
        info!("Chat session closed");
    }

    /// Subscribe to session events. Subscribers re-attach across reconnects;
    /// the channel is owned by this manager, not by any one connection.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The event feed as a lazy stream, for consumers that prefer
    /// `StreamExt` combinators over a receiver loop.
    pub fn event_stream(&self) -> BroadcastStream<SessionEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.state.lock().await.status
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connection.is_some()
    }

    /// Last presence explicitly broadcast through this session.
    pub async fn presence(&self) -> Presence {
        self.state.lock().await.presence
    }

    async fn try_send(&self, frame: OutboundFrame) {
        let mut state = self.state.lock().await;
        let Some(conn) = state.connection.as_mut() else {
            warn!("Dropping outbound frame, no active connection: {:?}", frame);
            return;
        };
        if let Err(e) = conn.sink.send(WsMessage::Text(frame.to_json())).await {
            error!("Send failed, clearing connection: {}", e);
            if let Some(dead) = state.connection.take() {
                dead.reader.abort();
            }
            state.generation += 1;
            state.status = ConnectionStatus::Failed;
        }
    }
}

/// Consume frames until the server readiness signal arrives.
async fn wait_for_ready(source: &mut WsSource) -> anyhow::Result<()> {
    while let Some(message) = source.next().await {
        match message {
            Ok(WsMessage::Text(text)) => match InboundFrame::parse(&text) {
                Some(InboundFrame::WsReady) => return Ok(()),
                Some(other) => debug!("Frame before ws_ready ignored: {:?}", other),
                None => {}
            },
            Ok(WsMessage::Close(_)) => {
                return Err(anyhow!("server closed the connection during handshake"))
            }
            Ok(_) => {}
            Err(e) => return Err(anyhow!("transport error during handshake: {}", e)),
        }
    }
    Err(anyhow!("stream ended before readiness signal"))
}

/// Reader task: forwards inbound frames to subscribers in arrival order.
/// On transport failure it clears the live connection handle so the next
/// `connect` retries cleanly.
async fn read_loop(
    mut source: WsSource,
    account_id: String,
    events: broadcast::Sender<SessionEvent>,
    state: Arc<TokioMutex<SessionState>>,
    generation: u64,
) {
    loop {
        match source.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                let Some(frame) = InboundFrame::parse(&text) else {
                    continue;
                };
                let event = match frame {
                    InboundFrame::WsReady => continue,
                    InboundFrame::Message { from, text, id } => {
                        SessionEvent::NewMessage(ChatMessage {
                            id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                            sender_id: from,
                            recipient_id: account_id.clone(),
                            text,
                            created_at: chrono::Utc::now(),
                            delivery_status: DeliveryStatus::Delivered,
                        })
                    }
                    InboundFrame::Ack { local_id } => SessionEvent::MessageSentAck { local_id },
                    InboundFrame::Delivered { local_id } => SessionEvent::DeliveryAck { local_id },
                    InboundFrame::Failed { local_id } => SessionEvent::DeliveryFailed { local_id },
                };
                // A send error only means nobody is subscribed right now.
                let _ = events.send(event);
            }
            Some(Ok(WsMessage::Close(reason))) => {
                info!("Server closed the chat connection: {:?}", reason);
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!("Chat transport error: {}", e);
                break;
            }
            None => {
                info!("Chat stream ended");
                break;
            }
        }
    }

    // Mid-session loss of the transport. Unless a newer connection already
    // replaced this one, mark the session failed so a fresh connect retries
    // cleanly. Errors are not retried here; reconnection is caller-driven.
    let mut guard = state.lock().await;
    if guard.generation == generation {
        guard.connection = None;
        guard.status = ConnectionStatus::Failed;
    }
}
