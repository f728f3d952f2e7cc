//! HTTP/1.1 request framing, response head parsing and chunked
//! transfer-coding.
//!
//! Every request pins `Connection: close`, which keeps inbound framing
//! simple: a body is complete at the zero chunk, at `Content-Length` bytes,
//! or at EOF.

use crate::core::http::headers::HeaderMap;
use crate::core::http::types::TargetEndpoint;

pub(crate) const DEFAULT_ACCEPT: &str = "*/*";
pub(crate) const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br, zstd";

/// Parsed status line and headers of a response.
#[derive(Debug, Clone)]
pub(crate) struct ResponseHead {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
}

/// How the response body is delimited, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyFraming {
    Chunked,
    ContentLength(usize),
    ReadToEof,
}

/// Format an outbound request. `Host` and `Connection` are always owned by
/// the framer; caller copies of either are dropped. Missing `Accept`,
/// `Accept-Encoding` and (with a body) `Content-Length` are defaulted.
pub(crate) fn format_request(
    method: &str,
    target: &TargetEndpoint,
    headers: &HeaderMap,
    body: Option<&[u8]>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 + body.map_or(0, <[u8]>::len));
    out.extend_from_slice(format!("{method} {} HTTP/1.1\r\n", target.path_and_query).as_bytes());
    out.extend_from_slice(format!("Host: {}\r\n", target.host_header()).as_bytes());
    out.extend_from_slice(b"Connection: close\r\n");

    for (name, value) in headers.iter() {
        if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("connection") {
            continue;
        }
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }

    if !headers.contains("accept") {
        out.extend_from_slice(format!("Accept: {DEFAULT_ACCEPT}\r\n").as_bytes());
    }
    if !headers.contains("accept-encoding") {
        out.extend_from_slice(format!("Accept-Encoding: {DEFAULT_ACCEPT_ENCODING}\r\n").as_bytes());
    }
    if let Some(body) = body {
        if !headers.contains("content-length") {
            out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
    }
    out.extend_from_slice(b"\r\n");
    if let Some(body) = body {
        out.extend_from_slice(body);
    }
    out
}

/// Offset just past the `CRLFCRLF` header terminator, when present.
pub(crate) fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Parse the status line and header block. A malformed status line yields
/// status 200 with an empty reason, for compatibility with servers that
/// skip the preamble.
pub(crate) fn parse_head(head: &[u8]) -> ResponseHead {
    let text = String::from_utf8_lossy(head);
    let mut lines = text.split("\r\n");

    let (status, status_text) = parse_status_line(lines.next().unwrap_or(""));

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((name, value)) => headers.append(name.trim(), value.trim()),
            None => continue,
        }
    }

    ResponseHead {
        status,
        status_text,
        headers,
    }
}

fn parse_status_line(line: &str) -> (u16, String) {
    let mut parts = line.splitn(3, ' ');
    let proto = parts.next().unwrap_or("");
    let code = parts.next().and_then(|c| c.parse::<u16>().ok());
    let reason = parts.next().unwrap_or("").to_string();
    if !proto.starts_with("HTTP/") {
        return (200, String::new());
    }
    match code {
        Some(code) => (code, reason),
        None => (200, String::new()),
    }
}

/// Pick the body delimiter from the response headers.
pub(crate) fn body_framing(headers: &HeaderMap) -> BodyFraming {
    if let Some(te) = headers.combined("transfer-encoding") {
        if te
            .split(',')
            .any(|t| t.trim().eq_ignore_ascii_case("chunked"))
        {
            return BodyFraming::Chunked;
        }
    }
    if let Some(cl) = headers.get("content-length") {
        if let Ok(n) = cl.trim().parse::<usize>() {
            return BodyFraming::ContentLength(n);
        }
    }
    BodyFraming::ReadToEof
}

/// Incremental chunked-body scan. Returns the decoded bytes plus whether the
/// terminal zero-size chunk was reached.
///
/// Tolerances carried over from the behavior this replaces: malformed size
/// lines are skipped, chunk extensions after `;` are discarded, truncated
/// input yields the decoded prefix, and trailers are not exposed.
pub(crate) fn scan_chunked(input: &[u8]) -> (Vec<u8>, bool) {
    let mut out = Vec::new();
    let mut pos = 0usize;
    loop {
        let Some(line_end) = find_crlf(&input[pos..]).map(|i| pos + i) else {
            return (out, false);
        };
        let line = &input[pos..line_end];
        let size_text = String::from_utf8_lossy(line);
        let size_text = size_text.split(';').next().unwrap_or("").trim();
        let size = match usize::from_str_radix(size_text, 16) {
            Ok(size) => size,
            Err(_) => {
                tracing::debug!(
                    target = "http",
                    line = %size_text,
                    "skipping malformed chunk size line"
                );
                pos = line_end + 2;
                continue;
            }
        };
        if size == 0 {
            return (out, true);
        }

        let data_start = line_end + 2;
        let available = input.len().saturating_sub(data_start);
        if available < size {
            out.extend_from_slice(&input[data_start..]);
            return (out, false);
        }
        out.extend_from_slice(&input[data_start..data_start + size]);
        pos = data_start + size;
        if input[pos..].starts_with(b"\r\n") {
            pos += 2;
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Decode a chunked transfer-coded byte stream. Tolerant: see
/// [`scan_chunked`].
pub fn decode_chunked(input: &[u8]) -> Vec<u8> {
    scan_chunked(input).0
}
