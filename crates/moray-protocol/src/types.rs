//! Typed views of protocol commands and replies.

/// Storage command verbs.
///
/// `Cas` additionally carries a token on the wire; see
/// [`encode_store`](crate::command::encode_store).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVerb {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Cas,
}

impl StoreVerb {
    /// Wire name of the verb.
    pub fn as_str(self) -> &'static str {
        match self {
            StoreVerb::Set => "set",
            StoreVerb::Add => "add",
            StoreVerb::Replace => "replace",
            StoreVerb::Append => "append",
            StoreVerb::Prepend => "prepend",
            StoreVerb::Cas => "cas",
        }
    }
}

impl std::fmt::Display for StoreVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply to a storage command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreReply {
    /// The value was stored.
    Stored,
    /// The value was not stored (`add` on an existing key, `replace` on a
    /// missing one, `append`/`prepend` on a missing one).
    NotStored,
    /// `cas` lost the race: the item was modified since `gets`.
    Exists,
    /// `cas` on a key that no longer exists.
    NotFound,
}

impl StoreReply {
    /// The literal token the server sent.
    pub fn as_str(self) -> &'static str {
        match self {
            StoreReply::Stored => "STORED",
            StoreReply::NotStored => "NOT_STORED",
            StoreReply::Exists => "EXISTS",
            StoreReply::NotFound => "NOT_FOUND",
        }
    }
}

/// Header of one `VALUE` block in a retrieval response:
/// `VALUE <key> <flags> <bytes>[ <cas>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueHeader {
    /// Key as the server returned it (namespaced form).
    pub key: String,
    /// Opaque client flags stored alongside the value.
    pub flags: u32,
    /// Payload length in bytes (the payload and its CRLF follow the header).
    pub len: usize,
    /// CAS token; present only for `gets`.
    pub cas: Option<u64>,
}

/// A coerced `STAT` value.
///
/// The stats command returns everything as text; a few well-known fields
/// get friendlier types.
#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl StatValue {
    /// Coerces a raw stat value according to its field name.
    ///
    /// `version` always stays text (it merely looks numeric for releases
    /// like `1.2`), `rusage_user`/`rusage_system` arrive as
    /// `<secs>:<usecs>` and become seconds, all-digit values become
    /// integers, and anything else stays text.
    pub fn coerce(name: &str, raw: &str) -> StatValue {
        if name == "version" {
            return StatValue::Text(raw.to_owned());
        }
        if name == "rusage_user" || name == "rusage_system" {
            if let Some((secs, usecs)) = raw.split_once(':') {
                if let (Ok(s), Ok(u)) = (secs.parse::<i64>(), usecs.parse::<i64>()) {
                    return StatValue::Float(s as f64 + u as f64 / 1_000_000.0);
                }
            }
            return StatValue::Text(raw.to_owned());
        }
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = raw.parse::<i64>() {
                return StatValue::Int(n);
            }
        }
        StatValue::Text(raw.to_owned())
    }
}

impl std::fmt::Display for StatValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatValue::Int(n) => write!(f, "{n}"),
            StatValue::Float(x) => write!(f, "{x}"),
            StatValue::Text(s) => f.write_str(s),
        }
    }
}
