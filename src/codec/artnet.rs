//! Art-Net ArtDmx packet builder
//!
//! Byte layout (offsets):
//!
//! ```text
//!  0..8    "Art-Net\0"
//!  8..10   OpDmx 0x5000, little-endian
//! 10..12   protocol version 14, big-endian
//! 12       sequence
//! 13       physical port (0)
//! 14..16   universe, little-endian
//! 16..18   channel count 512, big-endian
//! 18..530  DMX data
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Packet identifier
pub const ARTNET_ID: &[u8; 8] = b"Art-Net\0";

/// OpDmx opcode
pub const OP_DMX: u16 = 0x5000;

/// Protocol revision carried in every packet
pub const PROTOCOL_VERSION: u16 = 14;

/// Channels per universe
pub const CHANNEL_COUNT: usize = 512;

/// Header size before the DMX data
pub const HEADER_LEN: usize = 18;

/// Total packet size
pub const PACKET_LEN: usize = HEADER_LEN + CHANNEL_COUNT;

/// Highest addressable universe (15-bit port address)
pub const MAX_UNIVERSE: u16 = 32767;

/// One universe worth of DMX data, already normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtDmxFrame {
    pub universe: u16,
    pub sequence: u8,
    pub channels: [u8; CHANNEL_COUNT],
}

impl ArtDmxFrame {
    /// Normalize loosely typed input into a frame
    ///
    /// Universe and sequence are rounded and clamped; channel values beyond
    /// the first 512 are ignored, non-finite values become 0, everything else
    /// is rounded and clamped to 0..=255.
    pub fn new(universe: f64, sequence: f64, data: &[f64]) -> Self {
        let mut channels = [0u8; CHANNEL_COUNT];
        for (slot, value) in channels.iter_mut().zip(data) {
            *slot = clamp_round(*value, 255.0) as u8;
        }
        Self {
            universe: clamp_round(universe, MAX_UNIVERSE as f64) as u16,
            sequence: clamp_round(sequence, 255.0) as u8,
            channels,
        }
    }

    /// Serialize to the 530-byte wire packet
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(PACKET_LEN);
        out.put_slice(ARTNET_ID);
        out.put_u16_le(OP_DMX);
        out.put_u16(PROTOCOL_VERSION);
        out.put_u8(self.sequence);
        out.put_u8(0);
        out.put_u16_le(self.universe);
        out.put_u16(CHANNEL_COUNT as u16);
        out.put_slice(&self.channels);
        out.freeze()
    }
}

/// Build an ArtDmx packet from loosely typed input
pub fn build_dmx_packet(universe: f64, sequence: f64, data: &[f64]) -> Bytes {
    ArtDmxFrame::new(universe, sequence, data).encode()
}

fn clamp_round(value: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.round().clamp(0.0, max)
}
