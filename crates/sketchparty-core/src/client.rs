//! WebSocket client for the relay server.
//!
//! Uses a background thread for non-blocking operation; events are drained
//! via `poll_events()` from the caller's loop.

use crate::protocol::{ClientMessage, GamePayload, PeerInfo, ProtocolError, ServerMessage};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{connect, Message};
use url::Url;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the relay client.
#[derive(Debug, Clone)]
pub enum NetEvent {
    /// Connected to the server.
    Connected,
    /// Disconnected from the server.
    Disconnected,
    /// Joined a room.
    Joined {
        room: String,
        participant_id: String,
        leader_id: String,
        peers: Vec<PeerInfo>,
    },
    /// A peer joined the room.
    PeerJoined { peer: PeerInfo },
    /// A peer left the room.
    PeerLeft { peer_id: String },
    /// The room leader changed.
    LeaderChanged { leader_id: String },
    /// A routed game payload from a peer (or from this node, for
    /// broadcasts that include the sender).
    Relayed { from: String, payload: GamePayload },
    /// Error occurred.
    Error { message: String },
}

/// Commands sent to the WebSocket thread.
enum WsCommand {
    Send(String),
    Close,
}

/// Relay client for native platforms.
pub struct RelayClient {
    state: ConnectionState,
    events: Vec<NetEvent>,
    /// Channel to send commands to the WebSocket thread.
    cmd_tx: Option<Sender<WsCommand>>,
    /// Channel to receive events from the WebSocket thread.
    event_rx: Option<Receiver<NetEvent>>,
    /// Handle to the WebSocket thread.
    _thread: Option<JoinHandle<()>>,
}

impl RelayClient {
    /// Create a new disconnected client.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            events: Vec::new(),
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }

    /// Connect to a relay server.
    pub fn connect(&mut self, url: &str) -> Result<(), String> {
        if self.cmd_tx.is_some() {
            return Err("Already connected".to_string());
        }

        // Validate URL
        let parsed_url = Url::parse(url).map_err(|e| format!("Invalid URL: {}", e))?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(format!(
                "Invalid WebSocket URL scheme: {}",
                parsed_url.scheme()
            ));
        }

        self.state = ConnectionState::Connecting;

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<NetEvent>();

        let url = url.to_string();

        let handle = thread::spawn(move || {
            log::info!("WebSocket thread: connecting to {}", url);

            match connect(&url) {
                Ok((mut socket, response)) => {
                    log::info!("WebSocket connected, status: {}", response.status());
                    let _ = event_tx.send(NetEvent::Connected);

                    // Read timeout on the underlying TCP stream keeps the
                    // loop responsive to outgoing commands.
                    {
                        let stream = socket.get_mut();
                        match stream {
                            tungstenite::stream::MaybeTlsStream::Plain(tcp) => {
                                let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                                let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
                            }
                            #[allow(unreachable_patterns)]
                            _ => {
                                log::debug!("TLS or other stream - using default timeout handling");
                            }
                        }
                    }

                    loop {
                        // Check for commands (non-blocking)
                        match cmd_rx.try_recv() {
                            Ok(WsCommand::Send(msg)) => {
                                log::debug!("WebSocket sending: {}", &msg[..msg.len().min(100)]);
                                if let Err(e) = socket.send(Message::Text(msg)) {
                                    log::error!("WebSocket send error: {}", e);
                                    break;
                                }
                            }
                            Ok(WsCommand::Close) => {
                                log::info!("WebSocket close requested");
                                let _ = socket.close(None);
                                break;
                            }
                            Err(TryRecvError::Disconnected) => {
                                log::info!("WebSocket command channel disconnected");
                                break;
                            }
                            Err(TryRecvError::Empty) => {}
                        }

                        // Check for incoming messages (with timeout)
                        match socket.read() {
                            Ok(Message::Text(txt)) => {
                                log::debug!("WebSocket received: {}", &txt[..txt.len().min(100)]);
                                match ServerMessage::from_json(&txt) {
                                    Ok(server_msg) => {
                                        let _ = event_tx.send(net_event_from(server_msg));
                                    }
                                    Err(ProtocolError::Malformed(e)) => {
                                        // Malformed messages are dropped; state
                                        // stays untouched.
                                        log::warn!("Dropping malformed server message: {}", e);
                                    }
                                }
                            }
                            Ok(Message::Ping(data)) => {
                                let _ = socket.send(Message::Pong(data));
                            }
                            Ok(Message::Close(_)) => {
                                log::info!("WebSocket received close frame");
                                break;
                            }
                            Ok(_) => {} // Ignore binary, pong
                            Err(tungstenite::Error::Io(ref e))
                                if e.kind() == std::io::ErrorKind::WouldBlock
                                    || e.kind() == std::io::ErrorKind::TimedOut =>
                            {
                                continue;
                            }
                            Err(e) => {
                                log::error!("WebSocket read error: {}", e);
                                break;
                            }
                        }
                    }

                    log::info!("WebSocket thread exiting");
                    let _ = event_tx.send(NetEvent::Disconnected);
                }
                Err(e) => {
                    log::error!("WebSocket connection failed: {}", e);
                    let _ = event_tx.send(NetEvent::Error {
                        message: format!("Connection failed: {}", e),
                    });
                }
            }
        });

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);

        Ok(())
    }

    /// Disconnect from the server.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Send a protocol message.
    pub fn send(&self, msg: &ClientMessage) -> Result<(), String> {
        let json = msg.to_json().map_err(|e| e.to_string())?;
        if let Some(ref tx) = self.cmd_tx {
            tx.send(WsCommand::Send(json))
                .map_err(|e| format!("Send failed: {}", e))
        } else {
            Err("Not connected".to_string())
        }
    }

    /// Join a room under a display name.
    pub fn join(&self, room: &str, name: &str) -> Result<(), String> {
        self.send(&ClientMessage::Join {
            room: room.to_string(),
            name: name.to_string(),
        })
    }

    /// Leave the current room. The connection stays open so another room
    /// can be joined.
    pub fn leave(&self) -> Result<(), String> {
        self.send(&ClientMessage::Leave)
    }

    /// Broadcast a game payload to the whole room, including this node.
    pub fn broadcast(&self, payload: GamePayload) -> Result<(), String> {
        self.send(&ClientMessage::Broadcast { payload })
    }

    /// Send a game payload point-to-point to one participant.
    pub fn direct(&self, to: &str, payload: GamePayload) -> Result<(), String> {
        self.send(&ClientMessage::Direct {
            to: to.to_string(),
            payload,
        })
    }

    /// Poll for pending events (non-blocking).
    pub fn poll_events(&mut self) -> Vec<NetEvent> {
        if let Some(ref rx) = self.event_rx {
            while let Ok(event) = rx.try_recv() {
                match &event {
                    NetEvent::Connected => self.state = ConnectionState::Connected,
                    NetEvent::Disconnected => self.state = ConnectionState::Disconnected,
                    NetEvent::Error { .. } => self.state = ConnectionState::Error,
                    _ => {}
                }
                self.events.push(event);
            }
        }

        std::mem::take(&mut self.events)
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

fn net_event_from(msg: ServerMessage) -> NetEvent {
    match msg {
        ServerMessage::Joined {
            room,
            participant_id,
            leader_id,
            peers,
        } => NetEvent::Joined {
            room,
            participant_id,
            leader_id,
            peers,
        },
        ServerMessage::PeerJoined { peer } => NetEvent::PeerJoined { peer },
        ServerMessage::PeerLeft { peer_id } => NetEvent::PeerLeft { peer_id },
        ServerMessage::LeaderChanged { leader_id } => NetEvent::LeaderChanged { leader_id },
        ServerMessage::Relay { from, payload } => NetEvent::Relayed { from, payload },
        ServerMessage::Error { message } => NetEvent::Error { message },
    }
}

impl Default for RelayClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_scheme() {
        let mut client = RelayClient::new();
        assert!(client.connect("http://localhost:3001/ws").is_err());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_send_without_connection() {
        let client = RelayClient::new();
        assert!(client.join("room", "Alice").is_err());
        assert!(client.leave().is_err());
    }

    #[test]
    fn test_event_conversion() {
        let msg = ServerMessage::LeaderChanged {
            leader_id: "p2".to_string(),
        };
        match net_event_from(msg) {
            NetEvent::LeaderChanged { leader_id } => assert_eq!(leader_id, "p2"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
