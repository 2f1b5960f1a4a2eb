//! Pure parsing functions over an accumulated response buffer. No I/O here.

use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::reader::{find_newline, literal_length};

/// Classification of the server greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Greeting {
    Ok,
    PreAuth,
    Bye,
}

/// Outcome of a tagged status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ok(String),
    No(String),
    Bad(String),
}

/// Classify the server's initial greeting line.
pub fn classify_greeting(response: &[u8]) -> Result<Greeting> {
    let first = protocol_lines(response)
        .into_iter()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| Error::Protocol("empty greeting".to_string()))?;
    let rest = first
        .trim_start()
        .strip_prefix('*')
        .map(str::trim_start)
        .ok_or_else(|| Error::Protocol(format!("greeting is not untagged: {first:?}")))?;

    if starts_with_word(rest, "OK") {
        Ok(Greeting::Ok)
    } else if starts_with_word(rest, "PREAUTH") {
        Ok(Greeting::PreAuth)
    } else if starts_with_word(rest, "BYE") {
        Ok(Greeting::Bye)
    } else {
        Err(Error::Protocol(format!("unrecognised greeting: {first:?}")))
    }
}

/// Find the tagged status line for `tag` and classify it.
///
/// Scans protocol lines only (see [`protocol_lines`]): a FETCH literal's
/// payload bytes can never be read as a spurious tagged status line here.
pub fn parse_status(response: &[u8], tag: &str) -> Result<Status> {
    for line in protocol_lines(response) {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix(tag) else {
            continue;
        };
        let Some(rest) = rest.strip_prefix(' ') else {
            continue;
        };
        let rest = rest.trim_start();
        if let Some(info) = strip_word(rest, "OK") {
            return Ok(Status::Ok(info.trim().to_string()));
        }
        if let Some(info) = strip_word(rest, "NO") {
            return Ok(Status::No(info.trim().to_string()));
        }
        if let Some(info) = strip_word(rest, "BAD") {
            return Ok(Status::Bad(info.trim().to_string()));
        }
    }
    Err(Error::Protocol(format!(
        "no tagged status line found for tag {tag:?}"
    )))
}

/// Scan untagged `* OK [UIDVALIDITY <n>] ...` lines for the UIDVALIDITY value.
///
/// Restricted to untagged `OK` protocol lines (spec.md §4.3): a FETCH body
/// happening to contain the literal text "UIDVALIDITY" cannot be mistaken
/// for the real announcement, both because literal payloads are excluded by
/// [`protocol_lines`] and because non-`* OK` lines are skipped outright.
pub fn extract_uidvalidity(response: &[u8]) -> Result<u32> {
    for line in protocol_lines(response) {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix('*') else {
            continue;
        };
        let rest = rest.trim_start();
        let Some(rest) = strip_word(rest, "OK") else {
            continue;
        };
        let Some(idx) = rest.find("UIDVALIDITY") else {
            continue;
        };
        let after = &rest[idx + "UIDVALIDITY".len()..];
        let digits: String = after
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if !digits.is_empty() {
            return digits
                .parse()
                .map_err(|_| Error::Protocol(format!("malformed UIDVALIDITY: {after:?}")));
        }
    }
    Err(Error::Protocol(
        "no UIDVALIDITY found in response".to_string(),
    ))
}

/// Concatenate the whitespace-separated integers from every `* SEARCH ...`
/// untagged line, in the order received.
pub fn parse_search(response: &[u8]) -> Vec<u32> {
    let mut uids = Vec::new();
    for line in protocol_lines(response) {
        let trimmed = line.trim_start();
        let Some(rest) = trimmed.strip_prefix('*') else {
            continue;
        };
        let rest = rest.trim_start();
        let Some(rest) = rest.strip_prefix("SEARCH") else {
            continue;
        };
        for tok in rest.split_whitespace() {
            if let Ok(uid) = tok.parse() {
                uids.push(uid);
            }
        }
    }
    uids
}

/// Find the first untagged FETCH response carrying a `BODY[]`/`BODY[HEADER]`
/// literal and return exactly the declared `{N}` bytes.
///
/// Operates on raw bytes throughout: the literal payload that follows `{N}`
/// need not be valid UTF-8 (8-bit RFC 822 content, binary attachments), so
/// this never routes the buffer through a `String`/`str` — doing so would
/// lossily replace invalid bytes with U+FFFD and shift every offset after
/// them, corrupting the literal window it's trying to slice.
pub fn parse_fetch_body(response: &[u8]) -> Result<Vec<u8>> {
    let bytes = response;
    let mut search_from = 0;

    while let Some(rel) = find_bytes(&bytes[search_from..], b"BODY[") {
        let body_pos = search_from + rel;

        let Some(close_rel) = find_bytes(&bytes[body_pos..], b"]") else {
            search_from = body_pos + "BODY[".len();
            continue;
        };
        let after_close = body_pos + close_rel + 1;

        let Some(brace_open_rel) = find_bytes(&bytes[after_close..], b"{") else {
            search_from = body_pos + "BODY[".len();
            continue;
        };
        let brace_open = after_close + brace_open_rel;

        let Some(brace_close_rel) = find_bytes(&bytes[brace_open..], b"}") else {
            search_from = body_pos + "BODY[".len();
            continue;
        };
        let brace_close = brace_open + brace_close_rel;

        let digits = &bytes[brace_open + 1..brace_close];
        let n: usize = match std::str::from_utf8(digits).ok().and_then(|s| s.parse().ok()) {
            Some(n) => n,
            None => {
                search_from = body_pos + "BODY[".len();
                continue;
            }
        };

        let mut payload_start = brace_close + 1;
        if bytes.get(payload_start) == Some(&b'\r') {
            payload_start += 1;
        }
        if bytes.get(payload_start) == Some(&b'\n') {
            payload_start += 1;
        }

        let payload_end = payload_start + n;
        if bytes.len() < payload_end {
            return Err(Error::Protocol(format!(
                "truncated literal: need {n} bytes at offset {payload_start}, have {}",
                bytes.len().saturating_sub(payload_start)
            )));
        }
        return Ok(bytes[payload_start..payload_end].to_vec());
    }

    Err(Error::Protocol(
        "no FETCH body literal found in response".to_string(),
    ))
}

/// Split an assembled response into its protocol lines, skipping over `{N}`
/// literal payloads exactly as `reader::read_until` does while streaming, so
/// the line-based scans above (status, UIDVALIDITY, SEARCH, greeting) can
/// never match text that happens to live inside a literal's body.
///
/// Each returned line is a lossy decode of just that one control line; IMAP
/// protocol lines are ASCII; any non-UTF-8 content only ever occurs inside a
/// literal payload, which this never decodes or returns as a line.
fn protocol_lines(response: &[u8]) -> Vec<Cow<'_, str>> {
    let mut lines = Vec::new();
    let mut pos = 0usize;

    while let Some(nl) = find_newline(response, pos) {
        let line_end = nl + 1;
        let line_bytes = &response[pos..line_end];

        if let Some(n) = literal_length(line_bytes) {
            pos = (line_end + n).min(response.len());
            continue;
        }

        lines.push(String::from_utf8_lossy(line_bytes));
        pos = line_end;
    }

    if pos < response.len() {
        lines.push(String::from_utf8_lossy(&response[pos..]));
    }

    lines
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn starts_with_word(s: &str, word: &str) -> bool {
    strip_word(s, word).is_some()
}

fn strip_word<'a>(s: &'a str, word: &str) -> Option<&'a str> {
    let rest = s.strip_prefix(word)?;
    if rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\r') || rest.starts_with('\n')
    {
        Some(rest)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_ok_preauth_and_bye_greetings() {
        assert_eq!(
            classify_greeting(b"* OK IMAP4rev1 ready\r\n").unwrap(),
            Greeting::Ok
        );
        assert_eq!(
            classify_greeting(b"* PREAUTH already authenticated\r\n").unwrap(),
            Greeting::PreAuth
        );
        assert_eq!(classify_greeting(b"* BYE shutting down\r\n").unwrap(), Greeting::Bye);
    }

    #[test]
    fn unknown_greeting_is_a_protocol_error() {
        assert!(classify_greeting(b"* WEIRD\r\n").is_err());
    }

    #[test]
    fn parses_ok_no_and_bad_status_lines() {
        assert_eq!(
            parse_status(b"A1 OK logged in\r\n", "A1").unwrap(),
            Status::Ok("logged in".to_string())
        );
        assert_eq!(
            parse_status(b"A1 NO bad password\r\n", "A1").unwrap(),
            Status::No("bad password".to_string())
        );
        assert_eq!(
            parse_status(b"A1 BAD unknown command\r\n", "A1").unwrap(),
            Status::Bad("unknown command".to_string())
        );
    }

    #[test]
    fn status_parsing_does_not_match_a_different_tag() {
        let response = b"A1 OK logged in\r\n";
        assert!(parse_status(response, "A10").is_err());
    }

    #[test]
    fn extracts_uidvalidity_from_untagged_ok() {
        let response = b"* OK [UIDVALIDITY 222] ok\r\nA1 OK done\r\n";
        assert_eq!(extract_uidvalidity(response).unwrap(), 222);
    }

    #[test]
    fn missing_uidvalidity_is_a_protocol_error() {
        assert!(extract_uidvalidity(b"* OK done\r\nA1 OK done\r\n").is_err());
    }

    #[test]
    fn parses_search_results_across_multiple_lines_in_order() {
        let response = b"* SEARCH 1 2 3\r\n* SEARCH 4\r\nA1 OK done\r\n";
        assert_eq!(parse_search(response), vec![1, 2, 3, 4]);
    }

    #[test]
    fn empty_search_result_is_permitted() {
        let response = b"* SEARCH\r\nA1 OK done\r\n";
        assert_eq!(parse_search(response), Vec::<u32>::new());
    }

    #[test]
    fn parses_exact_literal_body() {
        let response = b"* 1 FETCH (UID 7 BODY[] {12}\r\nHello World!)\r\nA1 OK done\r\n";
        assert_eq!(parse_fetch_body(response).unwrap(), b"Hello World!");
    }

    #[test]
    fn parses_headers_only_literal_body() {
        let response = b"* 1 FETCH (UID 9 BODY[HEADER] {5}\r\nHi!\r\n)\r\nA1 OK done\r\n";
        assert_eq!(parse_fetch_body(response).unwrap(), b"Hi!\r\n");
    }

    #[test]
    fn truncated_literal_is_a_protocol_error() {
        let response = b"* 1 FETCH (UID 7 BODY[] {100}\r\nHello World!)\r\nA1 OK done\r\n";
        assert!(matches!(parse_fetch_body(response), Err(Error::Protocol(_))));
    }

    #[test]
    fn missing_literal_marker_is_a_protocol_error() {
        let response = b"* 1 FETCH (UID 7 BODY[] NIL)\r\nA1 OK done\r\n";
        assert!(parse_fetch_body(response).is_err());
    }

    #[test]
    fn non_utf8_literal_body_is_preserved_byte_exact() {
        let mut response = Vec::new();
        response.extend_from_slice(b"* 1 FETCH (UID 7 BODY[] {4}\r\n");
        response.extend_from_slice(&[0xff, 0xfe, 0x00, 0x01]);
        response.extend_from_slice(b")\r\nA1 OK done\r\n");
        assert_eq!(parse_fetch_body(&response).unwrap(), vec![0xff, 0xfe, 0x00, 0x01]);
    }

    #[test]
    fn status_line_inside_a_literal_payload_does_not_satisfy_parse_status() {
        let mut response = Vec::new();
        response.extend_from_slice(b"* 1 FETCH (UID 7 BODY[] {13}\r\n");
        response.extend_from_slice(b"A1 NO fake!)\r\n");
        response.extend_from_slice(b"A1 OK done\r\n");
        assert_eq!(
            parse_status(&response, "A1").unwrap(),
            Status::Ok("done".to_string())
        );
    }

    #[test]
    fn uidvalidity_lookalike_inside_a_literal_payload_is_ignored() {
        let mut response = Vec::new();
        response.extend_from_slice(b"* 1 FETCH (UID 7 BODY[] {34}\r\n");
        response.extend_from_slice(b"* OK [UIDVALIDITY 999] forged\r\n)\r\n");
        response.extend_from_slice(b"* OK [UIDVALIDITY 222] ok\r\n");
        response.extend_from_slice(b"A1 OK done\r\n");
        assert_eq!(extract_uidvalidity(&response).unwrap(), 222);
    }
}
