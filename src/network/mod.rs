//! Network subsystem for OSC and Art-Net transport

pub mod listener;
pub mod sender;
pub mod udp;

pub use listener::{ListenerState, ListenerStatus, ReceivedMessage, UdpChannel};
pub use sender::{ArtNetSender, OscSender, SendReport};
pub use udp::{create_socket, normalize_host, normalize_port};
