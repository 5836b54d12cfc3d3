//! moray-client: a memcachedb client with replication groups and
//! consistent hashing.
//!
//! Extends the classic single-tier memcached client model with two
//! structural capabilities:
//!
//! - **Replication groups**: each group is a master/slave cluster sharing
//!   one keyspace. The client discovers which member is the writable
//!   master by probing, routes writes there, and round-robins reads over
//!   every member.
//! - **Consistent hashing across groups**: a ketama continuum keyed by
//!   *group names* (160 weighted points per group), so resizing the
//!   cluster reshuffles only a small fraction of keys.
//!
//! Failures have bounded blast radius: a server that errors is
//! quarantined for 30 seconds, each wire exchange gets one in-band retry,
//! and with two or more groups a key whose group died is transparently
//! re-routed once.
//!
//! # quick start
//!
//! ```no_run
//! use moray_client::{Client, GroupConfig, Options};
//!
//! fn main() -> Result<(), moray_client::Error> {
//!     let groups = vec![
//!         GroupConfig::new("east", 1, vec!["10.0.1.1:11211".parse()?]),
//!         GroupConfig::new("west", 1, vec!["10.0.2.1:11211".parse()?]),
//!     ];
//!     let client = Client::connect(groups, Options::default())?;
//!
//!     client.set("greeting", b"hello", 0)?;
//!     assert_eq!(client.get("greeting")?.as_deref(), Some(&b"hello"[..]));
//!     Ok(())
//! }
//! ```
//!
//! # concurrency
//!
//! A client is `Send + Sync`; every command serializes on one internal
//! mutex (requests on a socket are strictly synchronous, so there is
//! nothing to overlap). Use one client per worker when throughput
//! matters.

mod client;
mod codec;
mod config;
mod connection;
mod continuum;
mod error;
mod group;
mod server;

pub use client::Client;
pub use codec::{Codec, Transparent};
pub use config::{Endpoint, GroupConfig, Options, DEFAULT_PORT, DEFAULT_TIMEOUT};
pub use continuum::Continuum;
pub use error::Error;
pub use group::Group;
pub use server::{Server, ServerState};

pub use moray_protocol::{StatValue, StoreReply};
