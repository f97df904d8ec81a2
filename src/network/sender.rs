//! Outbound OSC and Art-Net
//!
//! Send failures are reported to the caller and never tear the sender down.

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;

use super::udp::create_send_socket;
use crate::codec::{encode_float_message, ArtDmxFrame};
use crate::error::NetworkError;

/// `{ok, error?}` outcome of one send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<(), NetworkError>> for SendReport {
    fn from(result: Result<(), NetworkError>) -> Self {
        match result {
            Ok(()) => Self { ok: true, error: None },
            Err(e) => Self {
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}

async fn send_packet(
    socket: &UdpSocket,
    packet: &[u8],
    host: &str,
    port: u16,
) -> Result<(), NetworkError> {
    let sent = socket
        .send_to(packet, (host, port))
        .await
        .map_err(|e| NetworkError::SendFailed(format!("{host}:{port}: {e}")))?;
    if sent != packet.len() {
        return Err(NetworkError::SendFailed(format!(
            "{host}:{port}: short send ({sent} of {} bytes)",
            packet.len()
        )));
    }
    Ok(())
}

/// Sends single-float OSC messages
pub struct OscSender {
    socket: UdpSocket,
    packets_sent: u64,
}

impl OscSender {
    pub fn new() -> Result<Self, NetworkError> {
        let socket = create_send_socket().map_err(|e| NetworkError::BindFailed {
            port: 0,
            reason: e.to_string(),
        })?;
        Ok(Self {
            socket,
            packets_sent: 0,
        })
    }

    pub async fn send_float(
        &mut self,
        host: &str,
        port: u16,
        address: &str,
        value: f64,
    ) -> Result<(), NetworkError> {
        let packet = encode_float_message(address, value);
        send_packet(&self.socket, &packet, host, port).await?;
        self.packets_sent += 1;
        tracing::trace!(%host, port, %address, value, "OSC sent");
        Ok(())
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }
}

/// Sends ArtDmx frames
pub struct ArtNetSender {
    socket: UdpSocket,
    packets_sent: u64,
}

impl ArtNetSender {
    pub fn new() -> Result<Self, NetworkError> {
        let socket = create_send_socket().map_err(|e| NetworkError::BindFailed {
            port: 0,
            reason: e.to_string(),
        })?;
        Ok(Self {
            socket,
            packets_sent: 0,
        })
    }

    pub async fn send(
        &mut self,
        host: &str,
        port: u16,
        frame: &ArtDmxFrame,
    ) -> Result<(), NetworkError> {
        send_packet(&self.socket, &frame.encode(), host, port).await?;
        self.packets_sent += 1;
        tracing::trace!(%host, port, universe = frame.universe, sequence = frame.sequence, "ArtDmx sent");
        Ok(())
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }
}
