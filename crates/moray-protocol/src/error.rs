//! Protocol error types for memcached text responses.

use thiserror::Error;

/// Errors that can occur while interpreting a server response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The server reported an error line: `ERROR`, `CLIENT_ERROR <msg>` or
    /// `SERVER_ERROR <msg>`. Carries the trimmed trailing message (empty for
    /// a bare `ERROR`).
    #[error("server replied with error: {0}")]
    ErrorReply(String),

    /// A response line did not match any shape the command expects.
    /// Carries the offending line with the CRLF stripped.
    #[error("unexpected response line: {0:?}")]
    Unexpected(String),

    /// A counter or header field that should be numeric was not.
    #[error("invalid number in response: {0:?}")]
    InvalidNumber(String),

    /// The connection closed in the middle of a response.
    #[error("unexpected end of stream")]
    UnexpectedEof,
}
