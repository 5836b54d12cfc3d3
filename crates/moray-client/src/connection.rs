//! Buffered framing over one TCP socket.
//!
//! Provides the two read shapes the text protocol needs: whole
//! CRLF-terminated lines and exact byte counts. Read deadlines come from
//! the socket itself (`SO_RCVTIMEO`, set at connect time) and surface as
//! `WouldBlock`/`TimedOut` errors.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use bytes::{Bytes, BytesMut};

/// Read buffer size.
const BUF_SIZE: usize = 16 * 1024;

/// A connected socket with a read buffer.
///
/// Requests on one connection are strictly synchronous: write a command,
/// read its full response, repeat. The buffer never holds more than the
/// tail of the current response.
#[derive(Debug)]
pub(crate) struct Connection {
    stream: TcpStream,
    rbuf: BytesMut,
}

impl Connection {
    pub(crate) fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            rbuf: BytesMut::with_capacity(BUF_SIZE),
        }
    }

    /// Writes the whole buffer to the socket.
    pub(crate) fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf)
    }

    /// Reads one line, up to and including the terminating `\n`.
    ///
    /// A clean close before the newline is `UnexpectedEof`.
    pub(crate) fn read_line(&mut self) -> io::Result<Bytes> {
        loop {
            if let Some(pos) = self.rbuf.iter().position(|&b| b == b'\n') {
                return Ok(self.rbuf.split_to(pos + 1).freeze());
            }
            self.fill()?;
        }
    }

    /// Reads exactly `n` bytes.
    pub(crate) fn read_exact(&mut self, n: usize) -> io::Result<Bytes> {
        while self.rbuf.len() < n {
            self.fill()?;
        }
        Ok(self.rbuf.split_to(n).freeze())
    }

    /// Pulls more data from the socket into the buffer.
    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; 4096];
        let n = self.stream.read(&mut chunk)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            ));
        }
        self.rbuf.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}
