//! Replication groups: master election and read fan-out.
//!
//! A group is an ordered set of servers replicating one keyspace. Exactly
//! one member accepts writes at a time; which one is discovered by
//! probing, not configured.

use std::io;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::GroupConfig;
use crate::connection::Connection;
use crate::error::Error;
use crate::server::Server;

/// The election probe. memcachedb masters answer `STORED`; slaves answer
/// a non-STORED status. The sentinel key is written into the database and
/// is visible to other clients; it cannot be elided without losing
/// compatibility.
const MASTER_PROBE: &[u8] = b"set CLIENT_TEST_MASTER 0 0 1\r\n0\r\n";

/// A master/slave cluster sharing one keyspace.
///
/// Once a master is elected, every server (master included) serves reads;
/// the read cursor round-robins across all of them.
#[derive(Debug)]
pub struct Group {
    name: String,
    weight: u32,
    servers: Vec<Server>,
    master: Option<usize>,
    cursor: usize,
}

impl Group {
    /// Builds the group's servers and elects a master.
    ///
    /// Fails when no server answers the probe with `STORED`: a group
    /// without a writable master is not usable.
    pub(crate) fn connect(
        config: &GroupConfig,
        timeout: Option<Duration>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let servers = config
            .servers
            .iter()
            .map(|ep| Server::new(ep, timeout))
            .collect();
        let mut group = Self {
            name: config.name.clone(),
            weight: config.weight,
            servers,
            master: None,
            cursor: 0,
        };
        group.elect_master()?;
        Ok(group)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// True while at least one server is usable.
    pub fn is_alive(&self) -> bool {
        self.servers.iter().any(Server::is_alive)
    }

    pub(crate) fn servers_mut(&mut self) -> &mut [Server] {
        &mut self.servers
    }

    /// Probes servers in list order; the first to answer `STORED` becomes
    /// the master.
    fn elect_master(&mut self) -> Result<usize, Error> {
        self.master = None;
        for i in 0..self.servers.len() {
            let server = &mut self.servers[i];
            if !server.is_alive() {
                continue;
            }
            let Some(conn) = server.acquire() else {
                continue;
            };
            match probe(conn) {
                Ok(true) => {
                    debug!(group = %self.name, master = %server.addr(), "elected master");
                    self.master = Some(i);
                    return Ok(i);
                }
                Ok(false) => {
                    // a slave answered; its connection stays usable for reads
                }
                Err(err) => {
                    warn!(group = %self.name, server = %server.addr(), error = %err,
                          "election probe failed");
                    server.mark_dead(&err.to_string());
                }
            }
        }
        Err(Error::NoMasterFound {
            group: self.name.clone(),
        })
    }

    /// The writable server, re-electing when the cached master has died.
    pub(crate) fn master(&mut self) -> Result<&mut Server, Error> {
        let index = match self.master {
            Some(i) if self.servers[i].is_alive() => i,
            _ => self.elect_master()?,
        };
        Ok(&mut self.servers[index])
    }

    /// The next readable server, round-robin over all members.
    ///
    /// The sweep is bounded to one full pass; a group with every member
    /// dead is a routing failure, not an infinite loop.
    pub(crate) fn next_slave(&mut self) -> Result<&mut Server, Error> {
        let n = self.servers.len();
        for _ in 0..n {
            self.cursor = (self.cursor + 1) % n;
            if self.servers[self.cursor].is_alive() {
                let i = self.cursor;
                return Ok(&mut self.servers[i]);
            }
        }
        Err(Error::NoServersAvailable)
    }
}

/// Sends the election probe and reads its one-line reply.
fn probe(conn: &mut Connection) -> io::Result<bool> {
    conn.write_all(MASTER_PROBE)?;
    let line = conn.read_line()?;
    Ok(line.starts_with(b"STORED"))
}
