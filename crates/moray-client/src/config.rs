//! Client configuration: endpoints, groups, and options.
//!
//! The configuration surface is fully typed; there is no runtime shape
//! sniffing. A cluster is a list of [`GroupConfig`]s, each naming its
//! replica set, plus an [`Options`] block.

use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

/// Default memcachedb port.
pub const DEFAULT_PORT: u16 = 11211;

/// Default per-I/O timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// One server address: `host:port[:weight]`.
///
/// Missing port defaults to 11211, missing weight to 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub weight: u32,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            weight: 1,
        }
    }

    /// The `host:port` form used in logs and the stats map.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let bad = |what: &str| Error::InvalidConfig(format!("{what} in endpoint {s:?}"));

        let mut fields = s.split(':');
        let host = match fields.next() {
            Some(h) if !h.is_empty() => h.to_owned(),
            _ => return Err(bad("empty host")),
        };
        let port = match fields.next() {
            None | Some("") => DEFAULT_PORT,
            Some(p) => p.parse().map_err(|_| bad("invalid port"))?,
        };
        let weight = match fields.next() {
            None | Some("") => 1,
            Some(w) => w.parse().map_err(|_| bad("invalid weight"))?,
        };
        if fields.next().is_some() {
            return Err(bad("too many fields"));
        }
        Ok(Self { host, port, weight })
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One replication group: a named master/slave set sharing a keyspace.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Name keyed into the continuum. Groups addressing the same logical
    /// cluster must agree on names across client processes.
    pub name: String,
    /// Relative share of the continuum (positive).
    pub weight: u32,
    /// Replica endpoints, probed in order during master election.
    pub servers: Vec<Endpoint>,
}

impl GroupConfig {
    pub fn new(name: impl Into<String>, weight: u32, servers: Vec<Endpoint>) -> Self {
        Self {
            name: name.into(),
            weight,
            servers,
        }
    }

    /// A single anonymous group, the legacy flat-server-list form.
    pub fn from_endpoints(servers: Vec<Endpoint>) -> Self {
        Self::new("default", 1, servers)
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.servers.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "group {:?} has no servers",
                self.name
            )));
        }
        if self.weight == 0 {
            return Err(Error::InvalidConfig(format!(
                "group {:?} has zero weight",
                self.name
            )));
        }
        Ok(())
    }
}

/// Client behavior switches.
#[derive(Debug, Clone)]
pub struct Options {
    /// Prefix applied to every key (`None` = no namespacing).
    pub namespace: Option<String>,
    /// Inserted between namespace and key.
    pub namespace_separator: String,
    /// Reject all mutating operations.
    pub readonly: bool,
    /// Allow calls from any thread (all commands still serialize on one
    /// mutex). When false, only the constructing thread may use the client.
    pub multithread: bool,
    /// Re-hash onto other groups when the routed group is dead.
    pub failover: bool,
    /// Per-I/O deadline for connect/read/write (`None` disables).
    pub timeout: Option<Duration>,
    /// Fire-and-forget writes: append ` noreply` and skip the response read.
    pub no_reply: bool,
    /// Reject encoded values over 1 MiB before writing anything.
    pub check_size: bool,
    /// Rewrite keys that are too long or contain whitespace to
    /// `SHA1_hex(key) + "-autofixed"` instead of failing.
    pub autofix_keys: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            namespace: None,
            namespace_separator: ":".to_owned(),
            readonly: false,
            multithread: true,
            failover: true,
            timeout: Some(DEFAULT_TIMEOUT),
            no_reply: false,
            check_size: true,
            autofix_keys: false,
        }
    }
}
