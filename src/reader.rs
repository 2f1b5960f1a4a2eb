//! Accumulates bytes from a [`Transport`] into complete, literal-aware IMAP responses.

use crate::error::{Error, Result};
use crate::transport::{Io, DEFAULT_READ_TIMEOUT};

/// Upper bound on `read_some` calls per response (spec.md §4.2).
const MAX_READ_ITERATIONS: usize = 1000;

/// Read bytes from `transport` until the tagged completion line for `tag` is
/// seen, honouring `{N}` literals along the way, and return the accumulated
/// response verbatim (including the trailing CRLF of the tagged line).
///
/// The returned bytes are raw server output, not text: a FETCH literal may
/// carry arbitrary 8-bit content, so nothing here is lossily re-encoded.
pub fn read_response(transport: &mut impl Io, tag: &str) -> Result<Vec<u8>> {
    read_until(transport, |line| is_tagged_completion(line, tag))
}

/// Read the server greeting: a single untagged response, complete after the
/// first non-empty line.
pub fn read_greeting(transport: &mut impl Io) -> Result<Vec<u8>> {
    read_until(transport, |line| !line.trim().is_empty())
}

/// Drive `read_some` calls into an internal buffer, scanning line-by-line and
/// skipping over literal payloads without interpreting their contents, until
/// a real protocol line satisfies `is_complete`.
///
/// This is the only place that decides completion: the literal-skip and the
/// tag check happen over the same scan, so a `{N}` payload that happens to
/// contain tag-like bytes is never mistaken for the real tagged line. The
/// line handed to `is_complete` is a lossy decode of just that one protocol
/// line (IMAP control lines are ASCII), never of literal payload bytes; the
/// buffer returned to the caller is the untouched raw bytes.
fn read_until(transport: &mut impl Io, is_complete: impl Fn(&str) -> bool) -> Result<Vec<u8>> {
    let mut raw: Vec<u8> = Vec::new();
    let mut scanned_to = 0usize;

    for _ in 0..MAX_READ_ITERATIONS {
        loop {
            let Some(nl) = find_newline(&raw, scanned_to) else {
                break;
            };
            let line_end = nl + 1;
            let line_bytes = &raw[scanned_to..line_end];

            if let Some(n) = literal_length(line_bytes) {
                let payload_end = line_end + n;
                if raw.len() < payload_end {
                    // Literal payload not fully buffered yet; wait for more bytes.
                    break;
                }
                scanned_to = payload_end;
                continue;
            }

            let line = String::from_utf8_lossy(line_bytes);
            scanned_to = line_end;
            if is_complete(&line) {
                return Ok(raw);
            }
        }

        let chunk = transport.read_some(DEFAULT_READ_TIMEOUT)?;
        raw.extend_from_slice(&chunk);
    }

    Err(Error::Protocol(
        "response did not complete within the read iteration budget".to_string(),
    ))
}

pub(crate) fn find_newline(buf: &[u8], from: usize) -> Option<usize> {
    buf[from..].iter().position(|&b| b == b'\n').map(|p| from + p)
}

/// If `line` ends (before its CRLF/LF) with `{N}`, return `N`.
///
/// Shared with `parser`, which re-runs this same literal-skip scan over an
/// already-assembled response to keep its own line-based lookups (status,
/// UIDVALIDITY, SEARCH) from ever matching inside a literal payload.
pub(crate) fn literal_length(line: &[u8]) -> Option<usize> {
    let trimmed = trim_trailing_newline(line);
    if !trimmed.ends_with(b"}") {
        return None;
    }
    let open = trimmed.iter().rposition(|&b| b == b'{')?;
    let digits = &trimmed[open + 1..trimmed.len() - 1];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn trim_trailing_newline(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    if end > 0 && line[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }
    &line[..end]
}

/// Whether `line` is the tagged completion line for `tag`: exact tag equality
/// (`A1` must not match `A10`), followed by whitespace and a status keyword.
fn is_tagged_completion(line: &str, tag: &str) -> bool {
    let trimmed_start = line.trim_start();
    let Some(rest) = trimmed_start.strip_prefix(tag) else {
        return false;
    };
    if !rest.starts_with(' ') {
        return false;
    }
    is_status_keyword(rest[1..].trim_start())
}

fn is_status_keyword(rest: &str) -> bool {
    for kw in ["OK", "NO", "BAD", "PREAUTH", "BYE"] {
        if let Some(after) = rest.strip_prefix(kw) {
            if after.is_empty()
                || after.starts_with(' ')
                || after.starts_with('\r')
                || after.starts_with('\n')
            {
                return true;
            }
        }
    }
    false
}
