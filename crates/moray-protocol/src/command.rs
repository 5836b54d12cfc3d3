//! Direct-to-buffer command encoding.
//!
//! Builds memcached text-protocol request lines straight into a `BytesMut`
//! with no intermediate strings. Integer formatting uses `itoa`.
//!
//! Key validation (length, whitespace) is the caller's responsibility;
//! encoders write key bytes verbatim.

use bytes::{BufMut, BytesMut};

use crate::types::StoreVerb;

/// Appended to write commands that don't want a reply.
const NOREPLY: &[u8] = b" noreply";

/// Encodes a storage command:
/// `<verb> <key> <flags> <exptime> <len>[ <cas>][ noreply]\r\n<payload>\r\n`.
///
/// `cas` must be `Some` exactly when `verb` is [`StoreVerb::Cas`].
pub fn encode_store(
    dst: &mut BytesMut,
    verb: StoreVerb,
    key: &str,
    flags: u32,
    exptime: u32,
    value: &[u8],
    cas: Option<u64>,
    noreply: bool,
) {
    debug_assert_eq!(cas.is_some(), verb == StoreVerb::Cas);

    dst.put_slice(verb.as_str().as_bytes());
    dst.put_u8(b' ');
    dst.put_slice(key.as_bytes());
    dst.put_u8(b' ');
    put_uint(dst, flags as u64);
    dst.put_u8(b' ');
    put_uint(dst, exptime as u64);
    dst.put_u8(b' ');
    put_uint(dst, value.len() as u64);
    if let Some(token) = cas {
        dst.put_u8(b' ');
        put_uint(dst, token);
    }
    if noreply {
        dst.put_slice(NOREPLY);
    }
    dst.put_slice(b"\r\n");
    dst.put_slice(value);
    dst.put_slice(b"\r\n");
}

/// Encodes `get <key> [key ...]\r\n`.
pub fn encode_get<'a>(dst: &mut BytesMut, keys: impl IntoIterator<Item = &'a str>) {
    encode_retrieval(dst, b"get", keys);
}

/// Encodes `gets <key> [key ...]\r\n` (returns CAS tokens).
pub fn encode_gets<'a>(dst: &mut BytesMut, keys: impl IntoIterator<Item = &'a str>) {
    encode_retrieval(dst, b"gets", keys);
}

fn encode_retrieval<'a>(
    dst: &mut BytesMut,
    verb: &[u8],
    keys: impl IntoIterator<Item = &'a str>,
) {
    dst.put_slice(verb);
    for key in keys {
        dst.put_u8(b' ');
        dst.put_slice(key.as_bytes());
    }
    dst.put_slice(b"\r\n");
}

/// Encodes `incr <key> <amount>[ noreply]\r\n`.
pub fn encode_incr(dst: &mut BytesMut, key: &str, amount: u64, noreply: bool) {
    encode_counter(dst, b"incr", key, amount, noreply);
}

/// Encodes `decr <key> <amount>[ noreply]\r\n`.
pub fn encode_decr(dst: &mut BytesMut, key: &str, amount: u64, noreply: bool) {
    encode_counter(dst, b"decr", key, amount, noreply);
}

fn encode_counter(dst: &mut BytesMut, verb: &[u8], key: &str, amount: u64, noreply: bool) {
    dst.put_slice(verb);
    dst.put_u8(b' ');
    dst.put_slice(key.as_bytes());
    dst.put_u8(b' ');
    put_uint(dst, amount);
    if noreply {
        dst.put_slice(NOREPLY);
    }
    dst.put_slice(b"\r\n");
}

/// Encodes `delete <key>[ noreply]\r\n`.
pub fn encode_delete(dst: &mut BytesMut, key: &str, noreply: bool) {
    dst.put_slice(b"delete ");
    dst.put_slice(key.as_bytes());
    if noreply {
        dst.put_slice(NOREPLY);
    }
    dst.put_slice(b"\r\n");
}

/// Encodes `stats\r\n`.
pub fn encode_stats(dst: &mut BytesMut) {
    dst.put_slice(b"stats\r\n");
}

/// Writes an unsigned integer as decimal ASCII directly into the buffer.
fn put_uint(dst: &mut BytesMut, val: u64) {
    let mut buf = itoa::Buffer::new();
    dst.put_slice(buf.format(val).as_bytes());
}
