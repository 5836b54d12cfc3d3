//! The unified client error.

use moray_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced by client operations.
///
/// Cache misses are not errors: retrieval operations return `Ok(None)`.
#[derive(Debug, Error)]
pub enum Error {
    /// The key is illegal after namespacing (whitespace or over 250 bytes).
    #[error("invalid key: {reason}")]
    InvalidKey { reason: String },

    /// A group or endpoint configuration was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A mutating operation was called on a read-only client.
    #[error("client is read-only")]
    Readonly,

    /// The client was built with an empty group list.
    #[error("no active groups")]
    NoActiveGroups,

    /// Routing gave up: every candidate group or server was dead.
    #[error("No servers available")]
    NoServersAvailable,

    /// No server in the group answered the election probe with `STORED`.
    #[error("No Master Server found in group {group:?}")]
    NoMasterFound { group: String },

    /// The routed server is inside its quarantine window.
    #[error("server {addr} is dead")]
    ServerDead { addr: String },

    /// A socket-level failure. The server has been marked dead.
    #[error("i/o error on {addr}: {source}")]
    Transport {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server sent something the protocol does not allow here.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The encoded value exceeds the 1 MiB limit (`check_size` is on).
    #[error("Value too large: {size} bytes (limit {limit})")]
    ValueTooLarge { size: usize, limit: usize },

    /// A single-threaded client was touched from a non-owning thread.
    #[error("client accessed from a thread other than its owner")]
    WrongThread,
}

impl Error {
    /// Whether the facade may transparently retry this failure on a
    /// different group.
    ///
    /// True for failures that left the routed server dead or unreachable;
    /// false for caller mistakes and for errors the server itself reported.
    pub(crate) fn is_failover_candidate(&self) -> bool {
        match self {
            Error::Transport { .. } | Error::ServerDead { .. } => true,
            Error::Protocol(ProtocolError::ErrorReply(_)) => false,
            Error::Protocol(_) => true,
            _ => false,
        }
    }
}
