//! OSC listener channel
//!
//! One UDP socket bound to one port. Every datagram is decoded and each
//! message reduced to its first finite numeric argument; messages without one
//! are dropped.
//!
//! ```text
//! stopped ──start──► binding ──ok──► listening
//!                       │                │ receive error
//!                       ▼ bind error     ▼
//!                     error ◄────────────┘
//! ```

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

use super::udp::create_socket;
use crate::codec::{decode_packet, OscMessage};
use crate::constants::MAX_DATAGRAM_SIZE;
use crate::error::NetworkError;

/// Listener lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerState {
    Stopped,
    Binding,
    Listening,
    Error,
}

/// Status report sent to the listener's owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerStatus {
    pub status: ListenerState,
    pub port: Option<u16>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ListenerStatus {
    pub fn new(status: ListenerState, port: Option<u16>) -> Self {
        Self {
            status,
            port,
            timestamp: chrono::Utc::now().timestamp_millis(),
            error: None,
        }
    }

    pub fn error(port: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(ListenerState::Error, port)
        }
    }
}

/// A decoded message with its extracted value and origin
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub message: OscMessage,
    pub value: f64,
    pub source: SocketAddr,
    pub listen_port: u16,
    pub timestamp: i64,
}

/// Extract `(message, value)` pairs from one datagram
///
/// Messages whose address does not start with `/` are malformed and skipped.
pub fn extract_values(datagram: &[u8]) -> Vec<(OscMessage, f64)> {
    decode_packet(datagram)
        .into_iter()
        .filter(OscMessage::has_valid_address)
        .filter_map(|message| {
            let value = message.first_finite_value()?;
            Some((message, value))
        })
        .collect()
}

/// UDP listener owning at most one bound socket
pub struct UdpChannel {
    bind_address: String,
    socket: Option<UdpSocket>,
    port: Option<u16>,
    state: ListenerState,
    buffer: Vec<u8>,
}

impl UdpChannel {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            socket: None,
            port: None,
            state: ListenerState::Stopped,
            buffer: vec![0u8; MAX_DATAGRAM_SIZE],
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Requested port while listening
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Actually bound address (differs from `port` when binding port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn is_listening(&self) -> bool {
        self.socket.is_some() && self.state == ListenerState::Listening
    }

    /// Bind `port`, replacing any existing binding
    ///
    /// Starting on the port already bound is a no-op success.
    pub async fn start(&mut self, port: u16) -> Result<u16, NetworkError> {
        if self.is_listening() && self.port == Some(port) {
            return Ok(port);
        }
        self.stop().await;

        self.state = ListenerState::Binding;
        match create_socket(&self.bind_address, port) {
            Ok(socket) => {
                tracing::info!("OSC listener bound to {}:{}", self.bind_address, port);
                self.socket = Some(socket);
                self.port = Some(port);
                self.state = ListenerState::Listening;
                Ok(port)
            }
            Err(e) => {
                tracing::warn!("OSC listener failed to bind port {}: {}", port, e);
                self.port = None;
                self.state = ListenerState::Error;
                Err(NetworkError::BindFailed {
                    port,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Close the socket; returns whether one was open
    pub async fn stop(&mut self) -> bool {
        let had_socket = self.socket.take().is_some();
        if had_socket {
            tracing::info!("OSC listener on port {:?} closed", self.port);
        }
        self.port = None;
        self.state = ListenerState::Stopped;
        had_socket
    }

    /// Wait for the next datagram and extract its values
    ///
    /// Never completes while no socket is bound. A receive error closes the
    /// socket and moves the channel to the error state.
    pub async fn recv(&mut self) -> Result<Vec<ReceivedMessage>, NetworkError> {
        let Some(socket) = self.socket.as_ref() else {
            return std::future::pending().await;
        };

        let result = socket.recv_from(&mut self.buffer).await;
        match result {
            Ok((len, source)) => {
                let listen_port = self.port.unwrap_or_default();
                let timestamp = chrono::Utc::now().timestamp_millis();
                let messages = extract_values(&self.buffer[..len])
                    .into_iter()
                    .map(|(message, value)| ReceivedMessage {
                        message,
                        value,
                        source,
                        listen_port,
                        timestamp,
                    })
                    .collect::<Vec<_>>();
                tracing::trace!(len, %source, messages = messages.len(), "datagram received");
                Ok(messages)
            }
            Err(e) => {
                tracing::warn!("OSC listener receive error: {}", e);
                self.socket = None;
                self.port = None;
                self.state = ListenerState::Error;
                Err(NetworkError::ReceiveFailed(e.to_string()))
            }
        }
    }
}
