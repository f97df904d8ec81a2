//! UDP socket setup

use std::io;
use std::net::{IpAddr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::constants::DEFAULT_SEND_HOST;

/// Kernel receive buffer requested for listeners
const RECV_BUFFER_SIZE: usize = 1 << 20;

/// Create a non-blocking listening socket bound to `bind_address:port`
///
/// Must be called from within a tokio runtime.
pub fn create_socket(bind_address: &str, port: u16) -> io::Result<UdpSocket> {
    let ip: IpAddr = bind_address.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid bind address: {bind_address}"),
        )
    })?;
    let addr = SocketAddr::new(ip, port);

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
        tracing::debug!("Could not enlarge receive buffer: {}", e);
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    UdpSocket::from_std(socket.into())
}

/// Create an ephemeral socket for outbound packets (broadcast allowed)
pub fn create_send_socket() -> io::Result<UdpSocket> {
    let addr = SocketAddr::from(([0, 0, 0, 0], 0));
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    UdpSocket::from_std(socket.into())
}

/// Round and clamp a loosely typed port to 1..=65535
pub fn normalize_port(value: Option<f64>, default: u16) -> u16 {
    match value {
        Some(port) if port.is_finite() => port.round().clamp(1.0, 65535.0) as u16,
        _ => default,
    }
}

/// Trimmed host, or the default send host when blank
pub fn normalize_host(host: Option<&str>) -> String {
    match host.map(str::trim) {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => DEFAULT_SEND_HOST.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_port() {
        assert_eq!(normalize_port(Some(9001.4), 1), 9001);
        assert_eq!(normalize_port(Some(0.0), 1), 1);
        assert_eq!(normalize_port(Some(70000.0), 1), 65535);
        assert_eq!(normalize_port(Some(f64::NAN), 9001), 9001);
        assert_eq!(normalize_port(None, 6454), 6454);
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host(Some("  10.0.0.2 ")), "10.0.0.2");
        assert_eq!(normalize_host(Some("   ")), "127.0.0.1");
        assert_eq!(normalize_host(None), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_create_socket_ephemeral() {
        let socket = create_socket("127.0.0.1", 0).unwrap();
        assert!(socket.local_addr().unwrap().port() > 0);

        assert!(create_socket("not-an-ip", 0).is_err());
    }
}
