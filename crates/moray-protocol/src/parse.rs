//! Response-line parsing.
//!
//! Operates on single CRLF-terminated lines the caller has already framed.
//! The caller owns the socket and the read loop; these functions are purely
//! synchronous, in the same spirit as the rest of this crate.
//!
//! Every parser first screens for server error lines (`ERROR`,
//! `CLIENT_ERROR ...`, `SERVER_ERROR ...`) so callers don't have to.

use crate::error::ProtocolError;
use crate::types::{StatValue, StoreReply, ValueHeader};

/// Strips a trailing CRLF (or bare LF) and decodes the line as UTF-8.
fn line_str(line: &[u8]) -> Result<&str, ProtocolError> {
    let line = match line {
        [rest @ .., b'\r', b'\n'] => rest,
        [rest @ .., b'\n'] => rest,
        _ => line,
    };
    std::str::from_utf8(line)
        .map_err(|_| ProtocolError::Unexpected(String::from_utf8_lossy(line).into_owned()))
}

/// Screens a response line for the server error forms.
///
/// Any line matching `^(CLIENT_|SERVER_)?ERROR` becomes
/// [`ProtocolError::ErrorReply`] carrying the whitespace-trimmed trailing
/// message. Other lines pass through untouched.
pub fn check_error_line(line: &[u8]) -> Result<(), ProtocolError> {
    let text = line_str(line)?;
    let rest = if let Some(rest) = text.strip_prefix("CLIENT_ERROR") {
        rest
    } else if let Some(rest) = text.strip_prefix("SERVER_ERROR") {
        rest
    } else if let Some(rest) = text.strip_prefix("ERROR") {
        rest
    } else {
        return Ok(());
    };
    Err(ProtocolError::ErrorReply(rest.trim().to_owned()))
}

/// Parses one retrieval response line.
///
/// Returns `Ok(Some(header))` for a `VALUE <key> <flags> <bytes>[ <cas>]`
/// line and `Ok(None)` for the terminating `END`.
pub fn parse_value_header(line: &[u8]) -> Result<Option<ValueHeader>, ProtocolError> {
    check_error_line(line)?;
    let text = line_str(line)?;
    if text == "END" {
        return Ok(None);
    }

    let unexpected = || ProtocolError::Unexpected(text.to_owned());
    let mut fields = text.split_ascii_whitespace();
    if fields.next() != Some("VALUE") {
        return Err(unexpected());
    }
    let key = fields.next().ok_or_else(unexpected)?;
    let flags = parse_num::<u32>(fields.next().ok_or_else(unexpected)?)?;
    let len = parse_num::<usize>(fields.next().ok_or_else(unexpected)?)?;
    let cas = match fields.next() {
        Some(tok) => Some(parse_num::<u64>(tok)?),
        None => None,
    };
    if fields.next().is_some() {
        return Err(unexpected());
    }

    Ok(Some(ValueHeader {
        key: key.to_owned(),
        flags,
        len,
        cas,
    }))
}

/// Parses a storage reply line into a [`StoreReply`].
pub fn parse_store_reply(line: &[u8]) -> Result<StoreReply, ProtocolError> {
    check_error_line(line)?;
    let text = line_str(line)?;
    match text.trim_end() {
        "STORED" => Ok(StoreReply::Stored),
        "NOT_STORED" => Ok(StoreReply::NotStored),
        "EXISTS" => Ok(StoreReply::Exists),
        "NOT_FOUND" => Ok(StoreReply::NotFound),
        _ => Err(ProtocolError::Unexpected(text.to_owned())),
    }
}

/// Parses an `incr`/`decr` reply.
///
/// Returns `Ok(None)` for `NOT_FOUND`, otherwise the new counter value.
/// Some servers pad the numeric reply with trailing spaces before the CRLF.
pub fn parse_counter_reply(line: &[u8]) -> Result<Option<u64>, ProtocolError> {
    check_error_line(line)?;
    let text = line_str(line)?.trim_end();
    if text == "NOT_FOUND" {
        return Ok(None);
    }
    parse_num::<u64>(text).map(Some)
}

/// Parses a `delete` reply: `true` for `DELETED`, `false` for `NOT_FOUND`.
pub fn parse_delete_reply(line: &[u8]) -> Result<bool, ProtocolError> {
    check_error_line(line)?;
    let text = line_str(line)?;
    match text.trim_end() {
        "DELETED" => Ok(true),
        "NOT_FOUND" => Ok(false),
        _ => Err(ProtocolError::Unexpected(text.to_owned())),
    }
}

/// Parses one `stats` response line.
///
/// Returns `Ok(Some((name, value)))` for `STAT <name> <value>` lines and
/// `Ok(None)` for the terminating `END`. Values are coerced per
/// [`StatValue::coerce`].
pub fn parse_stat_line(line: &[u8]) -> Result<Option<(String, StatValue)>, ProtocolError> {
    check_error_line(line)?;
    let text = line_str(line)?;
    if text == "END" {
        return Ok(None);
    }
    let rest = text
        .strip_prefix("STAT ")
        .ok_or_else(|| ProtocolError::Unexpected(text.to_owned()))?;
    let (name, raw) = rest
        .split_once(' ')
        .ok_or_else(|| ProtocolError::Unexpected(text.to_owned()))?;
    Ok(Some((name.to_owned(), StatValue::coerce(name, raw))))
}

fn parse_num<T: std::str::FromStr>(field: &str) -> Result<T, ProtocolError> {
    field
        .parse()
        .map_err(|_| ProtocolError::InvalidNumber(field.to_owned()))
}
