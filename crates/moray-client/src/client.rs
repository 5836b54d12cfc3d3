//! The client facade: key pipeline, routing, and the public command set.
//!
//! Every public operation validates and namespaces the key, routes it to a
//! group (directly with one group, through the continuum otherwise), picks
//! a server for the operation's role (reads round-robin the group, writes
//! go to the master), and runs the wire exchange under the client-wide
//! command mutex with one in-band retry.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use tracing::{info, warn};

use moray_protocol::{
    encode_decr, encode_delete, encode_get, encode_gets, encode_incr, encode_stats,
    encode_store, parse_counter_reply, parse_delete_reply, parse_stat_line,
    parse_store_reply, parse_value_header, ProtocolError, StatValue, StoreReply, StoreVerb,
};

use crate::codec::{Codec, Transparent};
use crate::config::{GroupConfig, Options};
use crate::connection::Connection;
use crate::continuum::Continuum;
use crate::error::Error;
use crate::group::Group;
use crate::server::Server;

/// Hard cap on key length, namespace included.
const MAX_KEY_LEN: usize = 250;

/// Hard cap on encoded value size when `check_size` is on.
const MAX_VALUE_SIZE: usize = 1_048_576;

/// Routing attempts (initial + rehashes) before giving up on a key.
const MAX_ROUTE_ATTEMPTS: u32 = 20;

/// Which server of a group an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Read,
    Write,
}

/// Mutable client state, guarded by the command mutex.
struct Inner {
    groups: Vec<Group>,
}

/// A memcachedb client over one or more replication groups.
///
/// All commands serialize on a single internal mutex: requests on any one
/// socket are strictly synchronous, and the sockets, read cursors, and
/// master elections are only touched under that lock. Workloads that need
/// concurrent throughput should use one client per worker.
pub struct Client {
    inner: Mutex<Inner>,
    /// Built only with two or more groups; single-group routing bypasses it.
    continuum: Option<Continuum>,
    options: Options,
    codec: Arc<dyn Codec>,
    owner: ThreadId,
}

impl Client {
    /// Connects to the configured groups and elects each group's master.
    ///
    /// Construction fails if any group has no server answering the
    /// election probe with `STORED`. An empty group list builds an
    /// inactive client whose operations fail with
    /// [`Error::NoActiveGroups`].
    pub fn connect(groups: Vec<GroupConfig>, options: Options) -> Result<Self, Error> {
        Self::with_codec(groups, options, Arc::new(Transparent))
    }

    /// Like [`Client::connect`], with a custom value codec.
    pub fn with_codec(
        configs: Vec<GroupConfig>,
        options: Options,
        codec: Arc<dyn Codec>,
    ) -> Result<Self, Error> {
        let mut names = HashSet::new();
        for config in &configs {
            config.validate()?;
            if !names.insert(config.name.clone()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate group name {:?}",
                    config.name
                )));
            }
        }

        let groups = configs
            .iter()
            .map(|config| Group::connect(config, options.timeout))
            .collect::<Result<Vec<_>, _>>()?;

        let continuum = (groups.len() >= 2)
            .then(|| Continuum::build(groups.iter().map(|g| (g.name(), g.weight()))));

        info!(groups = groups.len(), "client connected");
        Ok(Self {
            inner: Mutex::new(Inner { groups }),
            continuum,
            options,
            codec,
            owner: thread::current().id(),
        })
    }

    /// True when at least one group is configured.
    pub fn is_active(&self) -> bool {
        !self.inner.lock().groups.is_empty()
    }

    /// `host:port` of every configured server, grouped in list order.
    pub fn addresses(&self) -> Vec<String> {
        let mut inner = self.inner.lock();
        inner
            .groups
            .iter_mut()
            .flat_map(|g| g.servers_mut().iter().map(|s| s.addr()))
            .collect()
    }

    /// Closes every socket without quarantining anyone. Useful after
    /// `fork`, where inherited sockets must not be shared; intentionally
    /// exempt from the owning-thread check.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        for group in &mut inner.groups {
            for server in group.servers_mut() {
                server.close();
            }
        }
    }

    // -- Retrieval -----------------------------------------------------------

    /// Fetches a value. `Ok(None)` is a cache miss.
    pub fn get(&self, key: &str) -> Result<Option<Bytes>, Error> {
        self.get_inner(key, false)
    }

    /// Fetches a value without running it through the codec.
    pub fn get_raw(&self, key: &str) -> Result<Option<Bytes>, Error> {
        self.get_inner(key, true)
    }

    fn get_inner(&self, key: &str, raw: bool) -> Result<Option<Bytes>, Error> {
        self.check_thread()?;
        let ck = build_cache_key(&self.options, key)?;
        let hit = self.dispatch(&ck, Role::Read, &mut |conn| fetch_one(conn, &ck, false))?;
        Ok(hit.map(|(payload, _)| {
            if raw {
                payload
            } else {
                self.codec.decode(payload)
            }
        }))
    }

    /// Fetches a value together with its CAS token, for use with [`Client::cas`].
    pub fn gets(&self, key: &str) -> Result<Option<(Bytes, u64)>, Error> {
        self.check_thread()?;
        let ck = build_cache_key(&self.options, key)?;
        let hit = self.dispatch(&ck, Role::Read, &mut |conn| fetch_one(conn, &ck, true))?;
        match hit {
            None => Ok(None),
            Some((payload, Some(cas))) => Ok(Some((self.codec.decode(payload), cas))),
            Some((_, None)) => Err(ProtocolError::Unexpected(
                "gets reply missing cas token".to_owned(),
            )
            .into()),
        }
    }

    /// Fetches many keys at once, one wire request per owning server.
    ///
    /// The result maps the *original* keys to their values; misses are
    /// simply absent. This is the one operation that degrades instead of
    /// failing: a server that errors is logged and its keys are dropped
    /// from the result.
    pub fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, Bytes>, Error> {
        self.get_multi_inner(keys, false)
    }

    /// [`Client::get_multi`] without codec decoding.
    pub fn get_multi_raw(&self, keys: &[&str]) -> Result<HashMap<String, Bytes>, Error> {
        self.get_multi_inner(keys, true)
    }

    fn get_multi_inner(
        &self,
        keys: &[&str],
        raw: bool,
    ) -> Result<HashMap<String, Bytes>, Error> {
        self.check_thread()?;
        let mut inner = self.inner.lock();
        if inner.groups.is_empty() {
            return Err(Error::NoActiveGroups);
        }

        // cache_key -> original key, so responses map back exactly even
        // for autofixed keys
        let mut originals: HashMap<String, String> = HashMap::with_capacity(keys.len());
        let mut by_group: HashMap<usize, Vec<String>> = HashMap::new();
        for &key in keys {
            let ck = build_cache_key(&self.options, key)?;
            match self.route(&inner, &ck) {
                Ok(idx) => {
                    by_group.entry(idx).or_default().push(ck.clone());
                    originals.insert(ck, key.to_owned());
                }
                Err(err) => warn!(key, error = %err, "get_multi: skipping unroutable key"),
            }
        }

        let mut out = HashMap::new();
        for (idx, batch) in by_group {
            let group_name = inner.groups[idx].name().to_owned();
            let server = match inner.groups[idx].next_slave() {
                Ok(server) => server,
                Err(err) => {
                    warn!(group = %group_name, error = %err, "get_multi: skipping group");
                    continue;
                }
            };
            let addr = server.addr();
            let batch_keys: Vec<&str> = batch.iter().map(String::as_str).collect();
            match execute(server, &mut |conn| fetch_values(conn, &batch_keys)) {
                Ok(values) => {
                    for (returned_key, payload) in values {
                        if let Some(original) = originals.get(&returned_key) {
                            let data = if raw {
                                payload
                            } else {
                                self.codec.decode(payload)
                            };
                            out.insert(original.clone(), data);
                        }
                    }
                }
                Err(err) => {
                    warn!(server = %addr, error = %err, "get_multi: dropping server results");
                }
            }
        }
        Ok(out)
    }

    // -- Storage -------------------------------------------------------------

    /// Stores a value unconditionally.
    ///
    /// Returns the server's reply, or `None` in no-reply mode.
    pub fn set(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
        exptime: u32,
    ) -> Result<Option<StoreReply>, Error> {
        self.store(StoreVerb::Set, key, value.as_ref(), exptime, false, None)
    }

    /// [`Client::set`] without codec encoding.
    pub fn set_raw(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
        exptime: u32,
    ) -> Result<Option<StoreReply>, Error> {
        self.store(StoreVerb::Set, key, value.as_ref(), exptime, true, None)
    }

    /// Stores a value only if the key is absent.
    pub fn add(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
        exptime: u32,
    ) -> Result<Option<StoreReply>, Error> {
        self.store(StoreVerb::Add, key, value.as_ref(), exptime, false, None)
    }

    /// [`Client::add`] without codec encoding.
    pub fn add_raw(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
        exptime: u32,
    ) -> Result<Option<StoreReply>, Error> {
        self.store(StoreVerb::Add, key, value.as_ref(), exptime, true, None)
    }

    /// Stores a value only if the key already exists.
    pub fn replace(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
        exptime: u32,
    ) -> Result<Option<StoreReply>, Error> {
        self.store(StoreVerb::Replace, key, value.as_ref(), exptime, false, None)
    }

    /// [`Client::replace`] without codec encoding.
    pub fn replace_raw(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
        exptime: u32,
    ) -> Result<Option<StoreReply>, Error> {
        self.store(StoreVerb::Replace, key, value.as_ref(), exptime, true, None)
    }

    /// Appends bytes to an existing value. Always raw.
    pub fn append(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
    ) -> Result<Option<StoreReply>, Error> {
        self.store(StoreVerb::Append, key, value.as_ref(), 0, true, None)
    }

    /// Prepends bytes to an existing value. Always raw.
    pub fn prepend(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
    ) -> Result<Option<StoreReply>, Error> {
        self.store(StoreVerb::Prepend, key, value.as_ref(), 0, true, None)
    }

    /// Atomic read-modify-write: `gets` the current value, applies
    /// `transform`, and stores the result with the CAS token.
    ///
    /// `Ok(None)` means the key was absent (either at the `gets` or by the
    /// time the `cas` landed); [`StoreReply::Exists`] means a concurrent
    /// writer won and the caller should retry.
    pub fn cas(
        &self,
        key: &str,
        exptime: u32,
        transform: impl FnOnce(Bytes) -> Vec<u8>,
    ) -> Result<Option<StoreReply>, Error> {
        self.check_thread()?;
        if self.options.readonly {
            return Err(Error::Readonly);
        }
        let Some((value, token)) = self.gets(key)? else {
            return Ok(None);
        };
        let next = transform(value);
        match self.store(StoreVerb::Cas, key, &next, exptime, false, Some(token))? {
            Some(StoreReply::NotFound) => Ok(None),
            reply => Ok(reply),
        }
    }

    /// `get`, falling back to `produce` on a miss and storing the produced
    /// value with `add`, so a concurrent writer who populated the key in
    /// the meantime keeps theirs.
    pub fn fetch(
        &self,
        key: &str,
        exptime: u32,
        produce: impl FnOnce() -> Vec<u8>,
    ) -> Result<Bytes, Error> {
        if let Some(hit) = self.get(key)? {
            return Ok(hit);
        }
        let value = produce();
        self.add(key, &value, exptime)?;
        Ok(Bytes::from(value))
    }

    fn store(
        &self,
        verb: StoreVerb,
        key: &str,
        value: &[u8],
        exptime: u32,
        raw: bool,
        cas: Option<u64>,
    ) -> Result<Option<StoreReply>, Error> {
        self.check_thread()?;
        if self.options.readonly {
            return Err(Error::Readonly);
        }
        let ck = build_cache_key(&self.options, key)?;
        let payload = if raw {
            Bytes::copy_from_slice(value)
        } else {
            self.codec.encode(Bytes::copy_from_slice(value))
        };
        if self.options.check_size && payload.len() > MAX_VALUE_SIZE {
            return Err(Error::ValueTooLarge {
                size: payload.len(),
                limit: MAX_VALUE_SIZE,
            });
        }
        let no_reply = self.options.no_reply;
        self.dispatch(&ck, Role::Write, &mut |conn| {
            let mut buf = BytesMut::with_capacity(ck.len() + payload.len() + 48);
            encode_store(&mut buf, verb, &ck, 0, exptime, &payload, cas, no_reply);
            conn.write_all(&buf)?;
            if no_reply {
                return Ok(None);
            }
            let line = conn.read_line()?;
            Ok(Some(parse_store_reply(&line)?))
        })
    }

    // -- Counters and removal ------------------------------------------------

    /// Increments a counter. `Ok(None)` when the key is absent (or in
    /// no-reply mode).
    pub fn incr(&self, key: &str, amount: u64) -> Result<Option<u64>, Error> {
        self.counter(false, key, amount)
    }

    /// Decrements a counter, saturating at zero on the server side.
    pub fn decr(&self, key: &str, amount: u64) -> Result<Option<u64>, Error> {
        self.counter(true, key, amount)
    }

    fn counter(&self, decrement: bool, key: &str, amount: u64) -> Result<Option<u64>, Error> {
        self.check_thread()?;
        if self.options.readonly {
            return Err(Error::Readonly);
        }
        let ck = build_cache_key(&self.options, key)?;
        let no_reply = self.options.no_reply;
        self.dispatch(&ck, Role::Write, &mut |conn| {
            let mut buf = BytesMut::new();
            if decrement {
                encode_decr(&mut buf, &ck, amount, no_reply);
            } else {
                encode_incr(&mut buf, &ck, amount, no_reply);
            }
            conn.write_all(&buf)?;
            if no_reply {
                return Ok(None);
            }
            let line = conn.read_line()?;
            Ok(parse_counter_reply(&line)?)
        })
    }

    /// Removes a key. `Ok(Some(false))` when it didn't exist, `Ok(None)`
    /// in no-reply mode.
    pub fn delete(&self, key: &str) -> Result<Option<bool>, Error> {
        self.check_thread()?;
        if self.options.readonly {
            return Err(Error::Readonly);
        }
        let ck = build_cache_key(&self.options, key)?;
        let no_reply = self.options.no_reply;
        self.dispatch(&ck, Role::Write, &mut |conn| {
            let mut buf = BytesMut::new();
            encode_delete(&mut buf, &ck, no_reply);
            conn.write_all(&buf)?;
            if no_reply {
                return Ok(None);
            }
            let line = conn.read_line()?;
            Ok(Some(parse_delete_reply(&line)?))
        })
    }

    // -- Introspection -------------------------------------------------------

    /// Collects `stats` from every alive server of every group, keyed by
    /// `host:port`.
    pub fn stats(&self) -> Result<HashMap<String, HashMap<String, StatValue>>, Error> {
        self.check_thread()?;
        let mut inner = self.inner.lock();
        if inner.groups.is_empty() {
            return Err(Error::NoActiveGroups);
        }
        let mut out = HashMap::new();
        for group in &mut inner.groups {
            for server in group.servers_mut() {
                if !server.is_alive() {
                    continue;
                }
                let addr = server.addr();
                let stats = execute(server, &mut |conn| {
                    let mut buf = BytesMut::new();
                    encode_stats(&mut buf);
                    conn.write_all(&buf)?;
                    let mut map = HashMap::new();
                    loop {
                        let line = conn.read_line()?;
                        match parse_stat_line(&line)? {
                            Some((name, value)) => {
                                map.insert(name, value);
                            }
                            None => return Ok(map),
                        }
                    }
                })?;
                out.insert(addr, stats);
            }
        }
        Ok(out)
    }

    /// Name of the group that currently owns `key`. Diagnostic: the
    /// answer can change as groups die and recover.
    pub fn group_for_key(&self, key: &str) -> Result<String, Error> {
        self.check_thread()?;
        let ck = build_cache_key(&self.options, key)?;
        let inner = self.inner.lock();
        let idx = self.route(&inner, &ck)?;
        Ok(inner.groups[idx].name().to_owned())
    }

    // -- Routing and dispatch ------------------------------------------------

    fn check_thread(&self) -> Result<(), Error> {
        if !self.options.multithread && thread::current().id() != self.owner {
            return Err(Error::WrongThread);
        }
        Ok(())
    }

    /// Maps a namespaced key to a group index.
    ///
    /// One group is returned directly. Otherwise the continuum is searched
    /// with the key's CRC-32; when the owning group is dead and failover is
    /// on, the key is re-hashed with a bumping numeric prefix, the same
    /// scheme other ketama clients use, until a live group is found or the
    /// attempts are exhausted.
    fn route(&self, inner: &Inner, cache_key: &str) -> Result<usize, Error> {
        match inner.groups.len() {
            0 => Err(Error::NoActiveGroups),
            1 => Ok(0),
            _ => {
                let continuum = self.continuum.as_ref().ok_or(Error::NoActiveGroups)?;
                let mut hash = Continuum::hash_key(cache_key.as_bytes());
                for attempt in 0..MAX_ROUTE_ATTEMPTS {
                    let idx = continuum.locate(hash);
                    if inner.groups[idx].is_alive() {
                        return Ok(idx);
                    }
                    if !self.options.failover {
                        break;
                    }
                    hash = Continuum::hash_key(
                        format!("{}{}", attempt + 1, cache_key).as_bytes(),
                    );
                }
                Err(Error::NoServersAvailable)
            }
        }
    }

    /// Routes and runs one wire exchange; on a failure that killed the
    /// server, retries once through fresh routing when another group could
    /// take the key.
    fn dispatch<T>(
        &self,
        cache_key: &str,
        role: Role,
        f: &mut dyn FnMut(&mut Connection) -> OpResult<T>,
    ) -> Result<T, Error> {
        let mut inner = self.inner.lock();
        let can_failover = inner.groups.len() > 1;
        match self.attempt(&mut inner, cache_key, role, f) {
            Err(err) if can_failover && err.is_failover_candidate() => {
                warn!(key = %cache_key, error = %err, "retrying on another group");
                self.attempt(&mut inner, cache_key, role, f)
            }
            result => result,
        }
    }

    fn attempt<T>(
        &self,
        inner: &mut Inner,
        cache_key: &str,
        role: Role,
        f: &mut dyn FnMut(&mut Connection) -> OpResult<T>,
    ) -> Result<T, Error> {
        let idx = self.route(inner, cache_key)?;
        let group = &mut inner.groups[idx];
        let server = match role {
            Role::Read => group.next_slave()?,
            Role::Write => group.master()?,
        };
        execute(server, f)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// key pipeline
// ---------------------------------------------------------------------------

/// Builds the wire key: autofix (if enabled) runs *before* namespacing, so
/// the namespace survives verbatim; validation runs after, on the final
/// form.
fn build_cache_key(options: &Options, key: &str) -> Result<String, Error> {
    let prefix_len = options
        .namespace
        .as_ref()
        .map(|ns| ns.len() + options.namespace_separator.len())
        .unwrap_or(0);

    let needs_fix =
        key.chars().any(char::is_whitespace) || prefix_len + key.len() > MAX_KEY_LEN;
    let fixed;
    let key = if options.autofix_keys && needs_fix {
        fixed = format!("{}-autofixed", sha1_hex(key));
        fixed.as_str()
    } else {
        key
    };

    let full = match &options.namespace {
        Some(ns) => format!("{ns}{}{key}", options.namespace_separator),
        None => key.to_owned(),
    };

    if full.len() > MAX_KEY_LEN {
        return Err(Error::InvalidKey {
            reason: format!(
                "key is {} bytes after namespacing (max {MAX_KEY_LEN})",
                full.len()
            ),
        });
    }
    if full.chars().any(char::is_whitespace) {
        return Err(Error::InvalidKey {
            reason: "key contains whitespace".to_owned(),
        });
    }
    Ok(full)
}

fn sha1_hex(input: &str) -> String {
    Sha1::digest(input.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// ---------------------------------------------------------------------------
// wire exchanges
// ---------------------------------------------------------------------------

/// A failure inside one wire exchange, before classification.
enum OpError {
    Io(io::Error),
    Protocol(ProtocolError),
}

impl From<io::Error> for OpError {
    fn from(err: io::Error) -> Self {
        OpError::Io(err)
    }
}

impl From<ProtocolError> for OpError {
    fn from(err: ProtocolError) -> Self {
        OpError::Protocol(err)
    }
}

type OpResult<T> = Result<T, OpError>;

/// Reads one `VALUE` block (or `END`) for a single-key retrieval.
fn fetch_one(
    conn: &mut Connection,
    key: &str,
    with_cas: bool,
) -> OpResult<Option<(Bytes, Option<u64>)>> {
    let mut buf = BytesMut::new();
    if with_cas {
        encode_gets(&mut buf, [key]);
    } else {
        encode_get(&mut buf, [key]);
    }
    conn.write_all(&buf)?;

    let line = conn.read_line()?;
    let Some(header) = parse_value_header(&line)? else {
        return Ok(None);
    };
    let payload = conn.read_exact(header.len)?;
    expect_crlf(conn)?;
    let end = conn.read_line()?;
    if parse_value_header(&end)?.is_some() {
        return Err(ProtocolError::Unexpected(
            "multiple VALUE blocks for a single-key get".to_owned(),
        )
        .into());
    }
    Ok(Some((payload, header.cas)))
}

/// Reads `VALUE` blocks until `END` for a multi-key retrieval.
fn fetch_values(conn: &mut Connection, keys: &[&str]) -> OpResult<Vec<(String, Bytes)>> {
    let mut buf = BytesMut::new();
    encode_get(&mut buf, keys.iter().copied());
    conn.write_all(&buf)?;

    let mut out = Vec::new();
    loop {
        let line = conn.read_line()?;
        let Some(header) = parse_value_header(&line)? else {
            return Ok(out);
        };
        let payload = conn.read_exact(header.len)?;
        expect_crlf(conn)?;
        out.push((header.key, payload));
    }
}

fn expect_crlf(conn: &mut Connection) -> OpResult<()> {
    let tail = conn.read_exact(2)?;
    if &tail[..] != b"\r\n" {
        return Err(ProtocolError::Unexpected(format!(
            "payload not terminated by CRLF: {tail:?}"
        ))
        .into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// retry engine
// ---------------------------------------------------------------------------

fn is_deadline(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Runs one wire exchange against a server with exactly one in-band retry.
///
/// Timeouts and EOFs quarantine the server immediately. Other I/O errors
/// and malformed responses get one fresh-connection retry; a second
/// failure quarantines (a server that keeps speaking garbage is as good as
/// down). Server-reported `ERROR` lines close the socket and surface
/// without any retry: resending would just fail again.
fn execute<T>(
    server: &mut Server,
    f: &mut dyn FnMut(&mut Connection) -> OpResult<T>,
) -> Result<T, Error> {
    let mut retried = false;
    loop {
        let Some(conn) = server.acquire() else {
            return Err(Error::ServerDead {
                addr: server.addr(),
            });
        };
        match f(conn) {
            Ok(value) => return Ok(value),
            Err(OpError::Io(err)) if is_deadline(&err) => {
                server.mark_dead(&err.to_string());
                return Err(Error::Transport {
                    addr: server.addr(),
                    source: err,
                });
            }
            Err(OpError::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                server.mark_dead("connection closed by server");
                return Err(ProtocolError::UnexpectedEof.into());
            }
            Err(OpError::Io(err)) => {
                if retried {
                    server.mark_dead(&err.to_string());
                    return Err(Error::Transport {
                        addr: server.addr(),
                        source: err,
                    });
                }
                warn!(server = %server.addr(), error = %err, "i/o error, retrying on a fresh connection");
                server.close();
                retried = true;
            }
            Err(OpError::Protocol(err @ ProtocolError::ErrorReply(_))) => {
                server.close();
                return Err(err.into());
            }
            Err(OpError::Protocol(err)) => {
                if retried {
                    server.mark_dead(&err.to_string());
                    return Err(err.into());
                }
                warn!(server = %server.addr(), error = %err, "unexpected response, retrying on a fresh connection");
                server.close();
                retried = true;
            }
        }
    }
}
