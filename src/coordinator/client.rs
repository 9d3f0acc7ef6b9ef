//! WebSocket client for coordinator communication
//!
//! Provides a robust WebSocket client with:
//! - Automatic reconnection at a fixed delay, retried forever
//! - Liveness deadline enforcement (the coordinator pings, we pong)
//! - A decoded-message event stream in strict arrival order

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Message;
use crate::types::ViteAddress;

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for the coordinator client
#[derive(Debug, Clone)]
pub struct CoordinatorClientConfig {
    /// WebSocket URL of the coordinator
    pub url: String,

    /// Payout address, passed as a query parameter on connect
    pub address: ViteAddress,

    /// Fixed delay between reconnection attempts
    pub reconnect_delay: Duration,

    /// Force-close the transport if no liveness signal arrives within this
    /// bound
    pub liveness_timeout: Duration,

    /// Command/event channel capacity
    pub channel_capacity: usize,
}

impl CoordinatorClientConfig {
    /// Create a config with the reference timings
    pub fn new(url: impl Into<String>, address: ViteAddress) -> Self {
        Self {
            url: url.into(),
            address,
            reconnect_delay: Duration::from_secs(2),
            liveness_timeout: Duration::from_secs(45),
            channel_capacity: 100,
        }
    }

    /// The full connect URL with the address query parameter
    fn connect_url(&self) -> Result<Url> {
        Url::parse_with_params(&self.url, [("address", self.address.as_str())])
            .map_err(|e| Error::Config(format!("Invalid coordinator URL: {}", e)))
    }
}

// ─────────────────────────────────────────────────────────────────
// Connection State
// ─────────────────────────────────────────────────────────────────

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport; includes the reconnect-delay window
    #[default]
    Closed,
    /// Handshake in progress
    Connecting,
    /// Transport established, messages flow
    Open,
    /// Local shutdown requested
    Closing,
}

/// Internal client state, shared with the connection task
#[derive(Debug, Default)]
struct ClientState {
    /// Current connection state
    connection_state: ConnectionState,

    /// When the last liveness signal arrived on the current transport
    last_liveness: Option<Instant>,
}

// ─────────────────────────────────────────────────────────────────
// Command & Event Channels
// ─────────────────────────────────────────────────────────────────

/// Commands that can be sent to the connection task
#[derive(Debug)]
enum ClientCommand {
    /// Send a message to the coordinator
    Send(Message),

    /// Close the connection and stop reconnecting
    Shutdown,
}

/// Events emitted by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Connected to the coordinator
    Connected,

    /// The transport dropped; a reconnect is already scheduled
    Disconnected { reason: String },

    /// Waiting out the reconnect delay
    Reconnecting,

    /// One decoded inbound frame (pings are answered internally)
    Message(Message),
}

// ─────────────────────────────────────────────────────────────────
// Coordinator Client
// ─────────────────────────────────────────────────────────────────

/// WebSocket client for coordinator communication.
///
/// The client owns a single logical connection: reconnects replace the
/// underlying transport, never the client. Sends made while the connection
/// is not open are silently dropped; results lost to a disconnect window are
/// the coordinator's to re-issue.
pub struct CoordinatorClient {
    config: CoordinatorClientConfig,
    state: Arc<RwLock<ClientState>>,
    command_tx: mpsc::Sender<ClientCommand>,
}

impl CoordinatorClient {
    /// Create a new coordinator client
    pub fn new(config: CoordinatorClientConfig) -> Self {
        let (command_tx, _command_rx) = mpsc::channel(config.channel_capacity);

        Self {
            config,
            state: Arc::new(RwLock::new(ClientState::default())),
            command_tx,
        }
    }

    /// Start the connection task and return the event receiver
    pub async fn start(&mut self) -> Result<mpsc::Receiver<ClientEvent>> {
        let (event_tx, event_rx) = mpsc::channel(self.config.channel_capacity);
        let (command_tx, command_rx) = mpsc::channel(self.config.channel_capacity);

        self.command_tx = command_tx;

        // Resolve the URL up front: a bad URL is a configuration error, not
        // something the reconnect loop can fix.
        let url = self.config.connect_url()?;

        let config = self.config.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            run_client_loop(config, url, state, command_rx, event_tx).await;
        });

        Ok(event_rx)
    }

    /// Send a message to the coordinator. Best-effort: silently dropped when
    /// the connection is not open.
    pub async fn send(&self, message: Message) {
        let _ = self.command_tx.send(ClientCommand::Send(message)).await;
    }

    /// Close the connection and stop reconnecting
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(ClientCommand::Shutdown).await;
    }

    /// Get current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.state.read().connection_state
    }

    /// When the last liveness signal arrived on the current transport
    pub fn last_liveness(&self) -> Option<Instant> {
        self.state.read().last_liveness
    }
}

// ─────────────────────────────────────────────────────────────────
// Client Loop
// ─────────────────────────────────────────────────────────────────

/// Main client loop: connect, run the transport until it dies, wait the
/// fixed delay, repeat. There is no retry ceiling and no backoff growth;
/// the connection must eventually self-heal without operator intervention.
async fn run_client_loop(
    config: CoordinatorClientConfig,
    url: Url,
    state: Arc<RwLock<ClientState>>,
    mut command_rx: mpsc::Receiver<ClientCommand>,
    event_tx: mpsc::Sender<ClientEvent>,
) {
    let mut reconnect = Constant::new(config.reconnect_delay);

    'outer: loop {
        {
            let mut s = state.write();
            if s.connection_state == ConnectionState::Closing {
                break;
            }
            s.connection_state = ConnectionState::Connecting;
        }

        info!(url = %config.url, "Connecting to VPoW coordinator");

        match connect_async(url.as_str()).await {
            Ok((ws_stream, _response)) => {
                info!("Connected!");

                {
                    let mut s = state.write();
                    s.connection_state = ConnectionState::Open;
                    s.last_liveness = Some(Instant::now());
                }

                let _ = event_tx.send(ClientEvent::Connected).await;

                let (write, read) = ws_stream.split();

                let result = handle_connection(
                    &config,
                    &state,
                    &mut command_rx,
                    &event_tx,
                    write,
                    read,
                )
                .await;

                // The transport is gone either way; dropping write/read
                // tears the socket down even on the liveness path.
                {
                    let mut s = state.write();
                    s.last_liveness = None;
                    if s.connection_state != ConnectionState::Closing {
                        s.connection_state = ConnectionState::Closed;
                    }
                }

                match result {
                    Ok(()) => {
                        info!("Connection closed locally");
                        break 'outer;
                    }
                    Err(e) => {
                        warn!(error = %e.format_for_log(), "Connection lost");
                        let _ = event_tx
                            .send(ClientEvent::Disconnected { reason: e.to_string() })
                            .await;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to coordinator");
                state.write().connection_state = ConnectionState::Closed;
            }
        }

        // Fixed-delay reconnect window. Sends arriving now are dropped;
        // only shutdown is honored.
        let delay = reconnect.next_backoff().unwrap_or(config.reconnect_delay);
        let _ = event_tx.send(ClientEvent::Reconnecting).await;
        debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnection");

        let deadline = tokio::time::sleep(delay);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                cmd = command_rx.recv() => match cmd {
                    Some(ClientCommand::Send(message)) => {
                        debug!(action = %message.action(), "Dropping send while disconnected");
                    }
                    Some(ClientCommand::Shutdown) | None => {
                        state.write().connection_state = ConnectionState::Closing;
                        break 'outer;
                    }
                },
            }
        }
    }

    info!("Client loop terminated");
}

/// Drive one active transport until it closes, errors, or misses the
/// liveness deadline. `Ok(())` means a local close was requested; any error
/// takes the reconnect path.
async fn handle_connection<S, R>(
    config: &CoordinatorClientConfig,
    state: &Arc<RwLock<ClientState>>,
    command_rx: &mut mpsc::Receiver<ClientCommand>,
    event_tx: &mpsc::Sender<ClientEvent>,
    mut write: S,
    mut read: R,
) -> Result<()>
where
    S: SinkExt<WsMessage, Error = WsError> + Unpin,
    R: StreamExt<Item = std::result::Result<WsMessage, WsError>> + Unpin,
{
    // The deadline is scoped to this transport: leaving this function drops
    // it, so it can never fire against a replaced transport.
    let liveness = tokio::time::sleep(config.liveness_timeout);
    tokio::pin!(liveness);

    loop {
        tokio::select! {
            // Liveness deadline expired: the connection is silently dead
            () = liveness.as_mut() => {
                warn!(
                    deadline_secs = config.liveness_timeout.as_secs(),
                    "Ping timeout. Closing connection and reopening."
                );
                return Err(Error::LivenessTimeout {
                    deadline_secs: config.liveness_timeout.as_secs(),
                });
            }

            // Inbound frame from the coordinator
            frame = read.next() => {
                let message = match frame {
                    Some(Ok(WsMessage::Text(text))) => Message::from_json(&text),
                    Some(Ok(WsMessage::Binary(data))) => Message::from_json_bytes(&data),
                    Some(Ok(WsMessage::Ping(payload))) => {
                        write.send(WsMessage::Pong(payload)).await?;
                        state.write().last_liveness = Some(Instant::now());
                        liveness.as_mut().reset(Instant::now() + config.liveness_timeout);
                        continue;
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        state.write().last_liveness = Some(Instant::now());
                        liveness.as_mut().reset(Instant::now() + config.liveness_timeout);
                        continue;
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        return Err(Error::connection_lost(format!(
                            "close frame received: {:?}",
                            frame
                        )));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(Error::connection_lost(e.to_string())),
                    None => return Err(Error::connection_lost("stream ended")),
                };

                match message {
                    Ok(Message::Ping) => {
                        // Answer, then arm the deadline: both directions of
                        // the heartbeat reset the same timer.
                        send_message(&mut write, &Message::pong_now()).await?;
                        state.write().last_liveness = Some(Instant::now());
                        liveness.as_mut().reset(Instant::now() + config.liveness_timeout);
                        debug!("Answered coordinator ping");
                    }
                    Ok(message) => {
                        let _ = event_tx.send(ClientEvent::Message(message)).await;
                    }
                    Err(e) => {
                        // Malformed frames are ignored, never fatal
                        warn!(error = %e, "Ignoring malformed frame");
                    }
                }
            }

            // Command from the worker
            cmd = command_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(message)) => {
                        send_message(&mut write, &message).await?;
                    }
                    Some(ClientCommand::Shutdown) | None => {
                        state.write().connection_state = ConnectionState::Closing;
                        let _ = write.send(WsMessage::Close(None)).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Serialize and send one protocol message
async fn send_message<S>(write: &mut S, message: &Message) -> Result<()>
where
    S: SinkExt<WsMessage, Error = WsError> + Unpin,
{
    let json = message
        .to_json()
        .map_err(|e| Error::protocol_malformed(e.to_string()))?;
    write.send(WsMessage::Text(json)).await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
