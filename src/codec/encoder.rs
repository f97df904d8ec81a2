//! OSC message encoder
//!
//! Only the single-float message shape is produced; that is what the send path
//! emits for every automation lane.

use bytes::{BufMut, Bytes, BytesMut};

/// Address used when the caller's address is not an OSC address
pub const FALLBACK_ADDRESS: &str = "/value";

/// Type-tag string of a single-float message
const FLOAT_TYPE_TAGS: &str = ",f";

/// Round `size` up to the next multiple of four
pub fn align4(size: usize) -> usize {
    (size + 3) & !0x03
}

/// Append a null-terminated string zero-padded to a 4-byte boundary
pub fn write_padded_string(out: &mut impl BufMut, value: &str) {
    let raw = value.as_bytes();
    let padded = align4(raw.len() + 1);
    out.put_slice(raw);
    out.put_bytes(0, padded - raw.len());
}

/// Encode `address` + `value` as a single-float OSC message
///
/// Addresses that do not start with `/` are replaced by [`FALLBACK_ADDRESS`];
/// non-finite values are sent as `0.0`.
pub fn encode_float_message(address: &str, value: f64) -> Bytes {
    let address = if address.starts_with('/') {
        address
    } else {
        FALLBACK_ADDRESS
    };
    let value = if value.is_finite() { value as f32 } else { 0.0 };

    let mut out = BytesMut::with_capacity(align4(address.len() + 1) + 4 + 4);
    write_padded_string(&mut out, address);
    write_padded_string(&mut out, FLOAT_TYPE_TAGS);
    out.put_f32(value);
    out.freeze()
}
