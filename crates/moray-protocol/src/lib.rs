//! moray-protocol: memcached text protocol encoding and parsing.
//!
//! Provides direct-to-buffer request encoding and line-oriented response
//! parsing for the memcached text protocol as spoken by memcachedb.
//! This crate does no I/O: the client frames lines off the socket and
//! feeds them in.
//!
//! # quick start
//!
//! ```
//! use bytes::BytesMut;
//! use moray_protocol::{encode_store, parse_store_reply, StoreReply, StoreVerb};
//!
//! let mut buf = BytesMut::new();
//! encode_store(&mut buf, StoreVerb::Set, "key", 0, 0, b"value", None, false);
//! assert_eq!(&buf[..], b"set key 0 0 5\r\nvalue\r\n");
//!
//! assert_eq!(parse_store_reply(b"STORED\r\n").unwrap(), StoreReply::Stored);
//! ```

pub mod command;
pub mod error;
pub mod parse;
pub mod types;

pub use command::{
    encode_decr, encode_delete, encode_get, encode_gets, encode_incr, encode_stats,
    encode_store,
};
pub use error::ProtocolError;
pub use parse::{
    check_error_line, parse_counter_reply, parse_delete_reply, parse_stat_line,
    parse_store_reply, parse_value_header,
};
pub use types::{StatValue, StoreReply, StoreVerb, ValueHeader};
