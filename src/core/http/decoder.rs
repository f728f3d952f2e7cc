//! `Content-Encoding` decoding.
//!
//! Tokens are applied left to right over the already chunk-decoded body.
//! Real deployments layer codings (`gzip, br`), so ordering is strict.

use std::io::Read;

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};

use crate::core::errors::FetchError;
use crate::core::http::headers::HeaderMap;

/// Decode `body` according to the response's `Content-Encoding` chain.
///
/// After any successful decode the `Content-Encoding` header is removed and
/// `Content-Length` rewritten to the decoded length. Unknown tokens are left
/// alone. `br` and `zstd` failures are fatal; `deflate` tries raw deflate,
/// then zlib, then gzip (servers mislabel), propagating the last failure.
pub(crate) fn decode_body(headers: &mut HeaderMap, body: Vec<u8>) -> Result<Vec<u8>, FetchError> {
    let Some(encoding) = headers.combined("content-encoding") else {
        return Ok(body);
    };

    let mut data = body;
    let mut decoded_any = false;
    for token in encoding.split(',') {
        let token = token.trim().to_ascii_lowercase();
        match token.as_str() {
            "" => {}
            "gzip" => {
                data = gunzip(&data).map_err(|e| FetchError::Decode(format!("gzip: {e}")))?;
                decoded_any = true;
            }
            "deflate" => {
                data = inflate_lenient(&data)?;
                decoded_any = true;
            }
            "br" => {
                data = unbrotli(&data).map_err(|e| FetchError::Decode(format!("brotli: {e}")))?;
                decoded_any = true;
            }
            "zstd" => {
                data = unzstd(&data).map_err(|e| FetchError::Decode(format!("zstd: {e}")))?;
                decoded_any = true;
            }
            other => {
                tracing::debug!(
                    target = "http",
                    encoding = other,
                    "unknown content-encoding token left as-is"
                );
            }
        }
    }

    if decoded_any {
        headers.remove("content-encoding");
        headers.set("Content-Length", data.len().to_string());
    }
    Ok(data)
}

fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

fn inflate_raw(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    DeflateDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

fn inflate_zlib(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

fn inflate_lenient(data: &[u8]) -> Result<Vec<u8>, FetchError> {
    if let Ok(out) = inflate_raw(data) {
        return Ok(out);
    }
    if let Ok(out) = inflate_zlib(data) {
        return Ok(out);
    }
    gunzip(data).map_err(|e| FetchError::Decode(format!("deflate: {e}")))
}

fn unbrotli(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    brotli::Decompressor::new(data, 4096).read_to_end(&mut out)?;
    Ok(out)
}

fn unzstd(data: &[u8]) -> std::io::Result<Vec<u8>> {
    zstd::stream::decode_all(data)
}
