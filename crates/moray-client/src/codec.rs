//! The value codec seam.

use bytes::Bytes;

/// Round-trips in-memory values to the byte payloads stored on the server.
///
/// The client core treats values as opaque bytes; a codec can layer a
/// serialization format on top (compression, tagged encodings). The
/// `*_raw` operations bypass the codec entirely.
pub trait Codec: Send + Sync {
    /// Encodes a value into the payload sent to the server.
    fn encode(&self, value: Bytes) -> Bytes;

    /// Decodes a payload fetched from the server.
    fn decode(&self, payload: Bytes) -> Bytes;
}

/// The default codec: payloads pass through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Transparent;

impl Codec for Transparent {
    fn encode(&self, value: Bytes) -> Bytes {
        value
    }

    fn decode(&self, payload: Bytes) -> Bytes {
        payload
    }
}
