//! One TCP endpoint: lazy connect, liveness, and quarantine.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::Endpoint;
use crate::connection::Connection;

/// How long a failed server stays quarantined before reconnects are allowed.
pub(crate) const RETRY_DELAY: Duration = Duration::from_secs(30);

/// Connection lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    /// No socket; eligible to connect on next use.
    NotConnected,
    /// Socket open.
    Connected,
    /// Quarantined after a failure; no connect attempts until `retry_after`.
    Dead {
        reason: String,
        retry_after: Instant,
    },
}

/// A single memcachedb endpoint and its (at most one) socket.
#[derive(Debug)]
pub struct Server {
    host: String,
    port: u16,
    weight: u32,
    timeout: Option<Duration>,
    conn: Option<Connection>,
    state: ServerState,
}

impl Server {
    pub(crate) fn new(endpoint: &Endpoint, timeout: Option<Duration>) -> Self {
        Self {
            host: endpoint.host.clone(),
            port: endpoint.port,
            weight: endpoint.weight,
            timeout,
            conn: None,
            state: ServerState::NotConnected,
        }
    }

    /// `host:port`, as used in logs and the stats map.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// False only while inside the quarantine window. A quarantined server
    /// whose window has elapsed is alive again: the next acquire retries
    /// the connect.
    pub fn is_alive(&self) -> bool {
        match &self.state {
            ServerState::Dead { retry_after, .. } => Instant::now() >= *retry_after,
            _ => true,
        }
    }

    /// Returns the open connection, connecting lazily if needed.
    ///
    /// `None` while quarantined or when the connect fails (which starts a
    /// new quarantine).
    pub(crate) fn acquire(&mut self) -> Option<&mut Connection> {
        if self.conn.is_some() {
            return self.conn.as_mut();
        }
        if let ServerState::Dead { retry_after, .. } = &self.state {
            if Instant::now() < *retry_after {
                return None;
            }
        }
        match self.connect() {
            Ok(conn) => {
                debug!(server = %self.addr(), "connected");
                self.state = ServerState::Connected;
                self.conn = Some(conn);
                self.conn.as_mut()
            }
            Err(err) => {
                self.mark_dead(&err.to_string());
                None
            }
        }
    }

    fn connect(&self) -> io::Result<Connection> {
        let mut last_err = None;
        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            let attempt = match self.timeout {
                Some(t) => TcpStream::connect_timeout(&addr, t),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    // best effort: some platforms reject socket deadlines
                    let _ = stream.set_read_timeout(self.timeout);
                    let _ = stream.set_write_timeout(self.timeout);
                    return Ok(Connection::new(stream));
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")
        }))
    }

    /// Drops the socket and quarantines the server for [`RETRY_DELAY`].
    pub(crate) fn mark_dead(&mut self, reason: &str) {
        self.conn = None;
        warn!(server = %self.addr(), %reason, "marking server dead");
        self.state = ServerState::Dead {
            reason: reason.to_owned(),
            retry_after: Instant::now() + RETRY_DELAY,
        };
    }

    /// Drops the socket without quarantining: the server stays eligible
    /// for an immediate reconnect.
    pub(crate) fn close(&mut self) {
        self.conn = None;
        self.state = ServerState::NotConnected;
    }
}

impl std::fmt::Display for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            ServerState::NotConnected => write!(f, "{} (not connected)", self.addr()),
            ServerState::Connected => write!(f, "{} (connected)", self.addr()),
            ServerState::Dead { reason, .. } => {
                write!(f, "{} DEAD ({reason})", self.addr())
            }
        }
    }
}
