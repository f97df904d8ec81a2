//! Wire codecs
//!
//! OSC 1.0 subset (decode messages and bundles, encode single-float messages)
//! and the Art-Net ArtDmx packet layout.

pub mod artnet;
pub mod decoder;
pub mod encoder;

pub use artnet::{build_dmx_packet, ArtDmxFrame};
pub use decoder::{decode_packet, OscArg, OscMessage};
pub use encoder::encode_float_message;
