//! OSC packet decoder
//!
//! Decodes raw UDP payloads into flat lists of [`OscMessage`]. Bundles are
//! flattened depth-first in encounter order. Malformed input never produces an
//! error: decoding stops at the first violation and returns what was read.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_BUNDLE_DEPTH;

/// Address literal that opens a bundle
pub const BUNDLE_TAG: &str = "#bundle";

/// Size of the bundle time tag (ignored)
const TIME_TAG_LEN: usize = 8;

/// A single decoded OSC argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OscArg {
    Bool(bool),
    Int(i32),
    Float(f32),
    Double(f64),
    /// `h` tag, widened to floating point on decode
    Int64(f64),
    String(String),
    Nil,
}

impl OscArg {
    /// Numeric view of the argument, if it has one
    pub fn as_number(&self) -> Option<f64> {
        match self {
            OscArg::Int(v) => Some(*v as f64),
            OscArg::Float(v) => Some(*v as f64),
            OscArg::Double(v) | OscArg::Int64(v) => Some(*v),
            OscArg::Bool(_) | OscArg::String(_) | OscArg::Nil => None,
        }
    }
}

/// A decoded OSC message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    /// First argument that is a finite number
    pub fn first_finite_value(&self) -> Option<f64> {
        self.args
            .iter()
            .filter_map(OscArg::as_number)
            .find(|v| v.is_finite())
    }

    /// Whether the address looks like an OSC address pattern
    pub fn has_valid_address(&self) -> bool {
        self.address.starts_with('/')
    }
}

/// Decode a packet (message or bundle) into a flat message list
pub fn decode_packet(buffer: &[u8]) -> Vec<OscMessage> {
    let mut messages = Vec::new();
    decode_into(buffer, 0, &mut messages);
    messages
}

fn decode_into(buffer: &[u8], depth: usize, out: &mut Vec<OscMessage>) {
    let Some((address, next)) = read_string(buffer, 0) else {
        return;
    };

    if address == BUNDLE_TAG {
        if depth >= MAX_BUNDLE_DEPTH {
            tracing::trace!(depth, "bundle nesting too deep, branch dropped");
            return;
        }
        decode_bundle(buffer, next, depth, out);
        return;
    }

    let args = match read_string(buffer, next) {
        Some((tags, offset)) => match tags.strip_prefix(',') {
            Some(tags) => read_arguments(buffer, offset, tags),
            None => Vec::new(),
        },
        None => Vec::new(),
    };

    out.push(OscMessage { address, args });
}

fn decode_bundle(buffer: &[u8], after_tag: usize, depth: usize, out: &mut Vec<OscMessage>) {
    let mut offset = after_tag + TIME_TAG_LEN;
    if offset > buffer.len() {
        return;
    }

    while offset + 4 <= buffer.len() {
        let Some(size) = read_i32(buffer, offset) else {
            break;
        };
        offset += 4;
        if size <= 0 {
            break;
        }
        let size = size as usize;
        if offset + size > buffer.len() {
            break;
        }
        decode_into(&buffer[offset..offset + size], depth + 1, out);
        offset += size;
    }
}

fn read_arguments(buffer: &[u8], mut offset: usize, tags: &str) -> Vec<OscArg> {
    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.chars() {
        match read_argument(buffer, offset, tag) {
            Some((arg, next)) => {
                args.push(arg);
                offset = next;
            }
            None => break,
        }
    }
    args
}

fn read_argument(buffer: &[u8], offset: usize, tag: char) -> Option<(OscArg, usize)> {
    match tag {
        'i' => read_i32(buffer, offset).map(|v| (OscArg::Int(v), offset + 4)),
        'f' => read_array::<4>(buffer, offset)
            .map(|b| (OscArg::Float(f32::from_be_bytes(b)), offset + 4)),
        'd' => read_array::<8>(buffer, offset)
            .map(|b| (OscArg::Double(f64::from_be_bytes(b)), offset + 8)),
        'h' => read_array::<8>(buffer, offset)
            .map(|b| (OscArg::Int64(i64::from_be_bytes(b) as f64), offset + 8)),
        's' => read_string(buffer, offset).map(|(s, next)| (OscArg::String(s), next)),
        'T' => Some((OscArg::Bool(true), offset)),
        'F' => Some((OscArg::Bool(false), offset)),
        'N' | 'I' => Some((OscArg::Nil, offset)),
        _ => None,
    }
}

/// Read a null-terminated string padded to a 4-byte boundary
///
/// Returns the string and the offset just past its padding.
pub(crate) fn read_string(buffer: &[u8], offset: usize) -> Option<(String, usize)> {
    if offset >= buffer.len() {
        return None;
    }
    let len = buffer[offset..].iter().position(|&b| b == 0)?;
    let end = offset + len;
    let next = (end + 4) & !0x03;
    if next > buffer.len() {
        return None;
    }
    let value = String::from_utf8_lossy(&buffer[offset..end]).into_owned();
    Some((value, next))
}

fn read_i32(buffer: &[u8], offset: usize) -> Option<i32> {
    read_array::<4>(buffer, offset).map(i32::from_be_bytes)
}

fn read_array<const N: usize>(buffer: &[u8], offset: usize) -> Option<[u8; N]> {
    buffer.get(offset..offset.checked_add(N)?)?.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encoder::{encode_float_message, write_padded_string};
    use proptest::prelude::*;

    fn message(address: &str, tags: &str, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_padded_string(&mut out, address);
        write_padded_string(&mut out, tags);
        out.extend_from_slice(payload);
        out
    }

    fn bundle(elements: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        write_padded_string(&mut out, BUNDLE_TAG);
        out.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
        for element in elements {
            out.extend_from_slice(&(element.len() as i32).to_be_bytes());
            out.extend_from_slice(element);
        }
        out
    }

    #[test]
    fn test_float_roundtrip() {
        let packet = encode_float_message("/x", 0.5);
        let messages = decode_packet(&packet);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].address, "/x");
        assert_eq!(messages[0].args, vec![OscArg::Float(0.5)]);
    }

    #[test]
    fn test_all_argument_types() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&7i32.to_be_bytes());
        payload.extend_from_slice(&1.25f32.to_be_bytes());
        payload.extend_from_slice(&2.5f64.to_be_bytes());
        payload.extend_from_slice(&(-3i64).to_be_bytes());
        write_padded_string(&mut payload, "hey");

        let packet = message("/all", ",ifdhsTFNI", &payload);
        let messages = decode_packet(&packet);
        assert_eq!(
            messages[0].args,
            vec![
                OscArg::Int(7),
                OscArg::Float(1.25),
                OscArg::Double(2.5),
                OscArg::Int64(-3.0),
                OscArg::String("hey".into()),
                OscArg::Bool(true),
                OscArg::Bool(false),
                OscArg::Nil,
                OscArg::Nil,
            ]
        );
    }

    #[test]
    fn test_bundle_flattening_order() {
        let a = encode_float_message("/a", 1.0).to_vec();
        let b = encode_float_message("/b", 2.0).to_vec();
        let c = encode_float_message("/c", 3.0).to_vec();
        let d = encode_float_message("/d", 4.0).to_vec();
        let packet = bundle(&[a, bundle(&[b, c]), d]);

        let addresses: Vec<_> = decode_packet(&packet)
            .into_iter()
            .map(|m| m.address)
            .collect();
        assert_eq!(addresses, vec!["/a", "/b", "/c", "/d"]);
    }

    #[test]
    fn test_unterminated_address_is_empty() {
        assert!(decode_packet(b"/abc").is_empty());
        assert!(decode_packet(&[]).is_empty());
    }

    #[test]
    fn test_missing_type_tags() {
        let mut packet = Vec::new();
        write_padded_string(&mut packet, "/bare");
        let messages = decode_packet(&packet);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].args.is_empty());

        let packet = message("/weird", "ff", &[0, 0, 0, 0]);
        assert!(decode_packet(&packet)[0].args.is_empty());
    }

    #[test]
    fn test_truncated_arguments_keep_prefix() {
        let mut payload = 5i32.to_be_bytes().to_vec();
        payload.extend_from_slice(&[0, 0]);
        let packet = message("/t", ",if", &payload);
        assert_eq!(decode_packet(&packet)[0].args, vec![OscArg::Int(5)]);
    }

    #[test]
    fn test_unknown_tag_stops_arguments() {
        let mut payload = 1i32.to_be_bytes().to_vec();
        payload.extend_from_slice(&2i32.to_be_bytes());
        let packet = message("/u", ",ixi", &payload);
        assert_eq!(decode_packet(&packet)[0].args, vec![OscArg::Int(1)]);
    }

    #[test]
    fn test_corrupt_bundle_element_keeps_siblings() {
        let a = encode_float_message("/a", 1.0).to_vec();
        let mut packet = bundle(&[a]);
        packet.extend_from_slice(&100i32.to_be_bytes());
        packet.extend_from_slice(&[1, 2, 3, 4]);

        let messages = decode_packet(&packet);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].address, "/a");
    }

    #[test]
    fn test_deep_bundle_nesting_is_bounded() {
        let mut packet = encode_float_message("/deep", 1.0).to_vec();
        for _ in 0..MAX_BUNDLE_DEPTH + 4 {
            packet = bundle(&[packet]);
        }
        assert!(decode_packet(&packet).is_empty());

        let mut packet = encode_float_message("/ok", 1.0).to_vec();
        for _ in 0..MAX_BUNDLE_DEPTH {
            packet = bundle(&[packet]);
        }
        assert_eq!(decode_packet(&packet).len(), 1);
    }

    #[test]
    fn test_first_finite_value() {
        let msg = OscMessage {
            address: "/m".into(),
            args: vec![
                OscArg::String("x".into()),
                OscArg::Bool(true),
                OscArg::Float(f32::NAN),
                OscArg::Int(3),
            ],
        };
        assert_eq!(msg.first_finite_value(), Some(3.0));

        let none = OscMessage {
            address: "/n".into(),
            args: vec![OscArg::Nil, OscArg::Double(f64::INFINITY)],
        };
        assert_eq!(none.first_finite_value(), None);
    }

    proptest! {
        #[test]
        fn prop_arbitrary_bytes_never_panic(raw in prop::collection::vec(any::<u8>(), 0..512)) {
            let _ = decode_packet(&raw);
        }

        #[test]
        fn prop_truncated_bundles_never_panic(cut in 0usize..64) {
            let a = encode_float_message("/a", 1.0).to_vec();
            let b = encode_float_message("/b", 2.0).to_vec();
            let packet = bundle(&[a, bundle(&[b])]);
            let cut = cut.min(packet.len());
            let messages = decode_packet(&packet[..cut]);
            prop_assert!(messages.len() <= 2);
        }
    }
}
