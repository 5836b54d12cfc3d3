//! Test helpers: scripted fake memcachedb servers.
//!
//! Each fake listens on a loopback port and speaks enough of the
//! memcached text protocol for the client under test: the election probe,
//! storage commands, retrieval, counters, delete, and stats. Replicas of
//! one fake group share a [`Store`], so writes through the master are
//! visible on the slaves.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use moray_client::Endpoint;

/// One stored item.
#[derive(Debug, Clone)]
pub struct Entry {
    pub data: Vec<u8>,
    pub flags: u32,
    pub cas: u64,
}

/// Key-value state shared by the replicas of one fake group.
#[derive(Default)]
pub struct Store {
    pub items: Mutex<HashMap<String, Entry>>,
    version: AtomicU64,
}

pub type SharedStore = Arc<Store>;

impl Store {
    pub fn shared() -> SharedStore {
        Arc::new(Store::default())
    }

    fn next_cas(&self) -> u64 {
        self.version.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Seeds an item directly, bypassing the wire.
    pub fn seed(&self, key: &str, data: &[u8]) {
        let entry = Entry {
            data: data.to_vec(),
            flags: 0,
            cas: self.next_cas(),
        };
        self.items.lock().unwrap().insert(key.to_owned(), entry);
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.items.lock().unwrap().get(key).map(|e| e.data.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.lock().unwrap().contains_key(key)
    }
}

/// How a fake behaves after the election probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A working server backed by its store.
    Store,
    /// Answers every non-probe command with an unparseable line.
    Garbage,
    /// Closes the connection after the probe exchange (and immediately on
    /// connections that never probe).
    Eof,
}

pub struct FakeOptions {
    /// Masters answer writes with `STORED`; slaves reject them with
    /// `NOT_STORED`, which is what master election keys on.
    pub master: bool,
    pub mode: Mode,
    pub store: SharedStore,
    /// STAT lines served for `stats`.
    pub stats: Vec<(&'static str, &'static str)>,
    /// Every byte received, for wire-shape assertions.
    pub recorder: Option<Arc<Mutex<Vec<u8>>>>,
}

impl Default for FakeOptions {
    fn default() -> Self {
        Self {
            master: true,
            mode: Mode::Store,
            store: Store::shared(),
            stats: vec![
                ("pid", "20188"),
                ("total_items", "32"),
                ("version", "1.2.3"),
                ("rusage_user", "1:300"),
                ("dummy", "ok"),
            ],
            recorder: None,
        }
    }
}

/// A fake memcachedb server on an ephemeral loopback port.
pub struct FakeServer {
    addr: SocketAddr,
    store: SharedStore,
}

impl FakeServer {
    /// A writable server with its own store.
    pub fn master() -> Self {
        Self::spawn(FakeOptions::default())
    }

    /// A read-only replica over an existing store.
    pub fn slave(store: SharedStore) -> Self {
        Self::spawn(FakeOptions {
            master: false,
            store,
            ..FakeOptions::default()
        })
    }

    /// A server that answers the probe correctly and then speaks garbage.
    pub fn garbage() -> Self {
        Self::spawn(FakeOptions {
            mode: Mode::Garbage,
            ..FakeOptions::default()
        })
    }

    pub fn spawn(opts: FakeOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let store = opts.store.clone();
        let opts = Arc::new(opts);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let opts = opts.clone();
                std::thread::spawn(move || handle(stream, &opts));
            }
        });
        Self { addr, store }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.addr.ip().to_string(), self.addr.port())
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }
}

fn record(opts: &FakeOptions, bytes: &[u8]) {
    if let Some(recorder) = &opts.recorder {
        recorder.lock().unwrap().extend_from_slice(bytes);
    }
}

fn handle(stream: TcpStream, opts: &FakeOptions) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut stream = stream;

    loop {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).unwrap_or(0) == 0 {
            return;
        }
        record(opts, &line);
        let text = String::from_utf8_lossy(&line).trim_end().to_string();
        let mut fields = text.split_whitespace().map(str::to_string);
        let verb = fields.next().unwrap_or_default();
        let args: Vec<String> = fields.collect();
        let noreply = args.last().map(String::as_str) == Some("noreply");

        let reply = match verb.as_str() {
            "set" | "add" | "replace" | "append" | "prepend" | "cas" => {
                // payload (+ CRLF) follows the command line
                let len: usize = args.get(3).and_then(|f| f.parse().ok()).unwrap_or(0);
                let mut payload = vec![0u8; len + 2];
                if reader.read_exact(&mut payload).is_err() {
                    return;
                }
                record(opts, &payload);
                payload.truncate(len);

                let is_probe =
                    args.first().map(String::as_str) == Some("CLIENT_TEST_MASTER");
                if is_probe {
                    let reply: &[u8] = if opts.master {
                        b"STORED\r\n"
                    } else {
                        b"NOT_STORED\r\n"
                    };
                    if stream.write_all(reply).is_err() {
                        return;
                    }
                    if opts.mode == Mode::Eof {
                        return;
                    }
                    continue;
                }
                match opts.mode {
                    Mode::Garbage => garbage_reply(),
                    Mode::Eof => return,
                    Mode::Store => apply_store(opts, &verb, &args, payload),
                }
            }
            "get" | "gets" => match opts.mode {
                Mode::Garbage => garbage_reply(),
                Mode::Eof => return,
                Mode::Store => retrieve(opts, verb == "gets", &args),
            },
            "incr" | "decr" => match opts.mode {
                Mode::Garbage => garbage_reply(),
                Mode::Eof => return,
                Mode::Store => counter(opts, verb == "decr", &args),
            },
            "delete" => match opts.mode {
                Mode::Garbage => garbage_reply(),
                Mode::Eof => return,
                Mode::Store => {
                    let key = args.first().cloned().unwrap_or_default();
                    if opts.store.items.lock().unwrap().remove(&key).is_some() {
                        b"DELETED\r\n".to_vec()
                    } else {
                        b"NOT_FOUND\r\n".to_vec()
                    }
                }
            },
            "stats" => match opts.mode {
                Mode::Garbage => garbage_reply(),
                Mode::Eof => return,
                Mode::Store => {
                    let mut out = Vec::new();
                    for (name, value) in &opts.stats {
                        out.extend_from_slice(format!("STAT {name} {value}\r\n").as_bytes());
                    }
                    out.extend_from_slice(b"END\r\n");
                    out
                }
            },
            _ => b"ERROR\r\n".to_vec(),
        };

        let suppress = noreply && verb != "get" && verb != "gets" && verb != "stats";
        if !suppress && stream.write_all(&reply).is_err() {
            return;
        }
    }
}

fn garbage_reply() -> Vec<u8> {
    b"BOGUS UNPARSEABLE LINE\r\n".to_vec()
}

fn apply_store(opts: &FakeOptions, verb: &str, args: &[String], payload: Vec<u8>) -> Vec<u8> {
    if !opts.master {
        // replicas reject writes
        return b"NOT_STORED\r\n".to_vec();
    }
    let key = args.first().cloned().unwrap_or_default();
    let flags: u32 = args.get(1).and_then(|f| f.parse().ok()).unwrap_or(0);
    let mut items = opts.store.items.lock().unwrap();
    let exists = items.contains_key(&key);

    let stored = |data: Vec<u8>| Entry {
        data,
        flags,
        cas: opts.store.next_cas(),
    };

    match verb {
        "set" => {
            items.insert(key, stored(payload));
            b"STORED\r\n".to_vec()
        }
        "add" if exists => b"NOT_STORED\r\n".to_vec(),
        "add" => {
            items.insert(key, stored(payload));
            b"STORED\r\n".to_vec()
        }
        "replace" if !exists => b"NOT_STORED\r\n".to_vec(),
        "replace" => {
            items.insert(key, stored(payload));
            b"STORED\r\n".to_vec()
        }
        "append" | "prepend" => match items.get_mut(&key) {
            None => b"NOT_STORED\r\n".to_vec(),
            Some(entry) => {
                if verb == "append" {
                    entry.data.extend_from_slice(&payload);
                } else {
                    let mut data = payload;
                    data.extend_from_slice(&entry.data);
                    entry.data = data;
                }
                entry.cas = opts.store.next_cas();
                b"STORED\r\n".to_vec()
            }
        },
        "cas" => {
            let token: u64 = args.get(4).and_then(|f| f.parse().ok()).unwrap_or(0);
            let current = items.get(&key).map(|entry| entry.cas);
            match current {
                None => b"NOT_FOUND\r\n".to_vec(),
                Some(cas) if cas != token => b"EXISTS\r\n".to_vec(),
                Some(_) => {
                    items.insert(key, stored(payload));
                    b"STORED\r\n".to_vec()
                }
            }
        }
        _ => b"ERROR\r\n".to_vec(),
    }
}

fn retrieve(opts: &FakeOptions, with_cas: bool, keys: &[String]) -> Vec<u8> {
    let items = opts.store.items.lock().unwrap();
    let mut out = Vec::new();
    for key in keys {
        if let Some(entry) = items.get(key) {
            let header = if with_cas {
                format!(
                    "VALUE {key} {} {} {}\r\n",
                    entry.flags,
                    entry.data.len(),
                    entry.cas
                )
            } else {
                format!("VALUE {key} {} {}\r\n", entry.flags, entry.data.len())
            };
            out.extend_from_slice(header.as_bytes());
            out.extend_from_slice(&entry.data);
            out.extend_from_slice(b"\r\n");
        }
    }
    out.extend_from_slice(b"END\r\n");
    out
}

fn counter(opts: &FakeOptions, decrement: bool, args: &[String]) -> Vec<u8> {
    let key = args.first().cloned().unwrap_or_default();
    let amount: u64 = args.get(1).and_then(|f| f.parse().ok()).unwrap_or(0);
    let mut items = opts.store.items.lock().unwrap();
    match items.get_mut(&key) {
        None => b"NOT_FOUND\r\n".to_vec(),
        Some(entry) => {
            let current: u64 = String::from_utf8_lossy(&entry.data)
                .trim()
                .parse()
                .unwrap_or(0);
            let next = if decrement {
                current.saturating_sub(amount)
            } else {
                current.wrapping_add(amount)
            };
            entry.data = next.to_string().into_bytes();
            entry.cas = opts.store.next_cas();
            format!("{next}\r\n").into_bytes()
        }
    }
}
