//! Crate-level error taxonomy surfaced by the public API.

use thiserror::Error;

use crate::core::proxy::errors::ProxyError;

/// Errors produced by [`crate::fetch`] and the engines beneath it.
///
/// Proxy configuration problems discovered inside the front door are not
/// surfaced through this type: they downgrade the request to the direct
/// client after a warning. Everything else propagates to the caller.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Invalid request input (bad URL, unsupported target scheme).
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure while establishing or speaking to the proxy tunnel.
    #[error(transparent)]
    Proxy(ProxyError),

    /// TLS handshake with the target failed.
    #[error("tls handshake failed: {0}")]
    Tls(String),

    /// Malformed HTTP response framing.
    #[error("http protocol error: {0}")]
    Http(String),

    /// Content decoding (gzip/deflate/br/zstd) failed.
    #[error("content decode error: {0}")]
    Decode(String),

    /// The cancellation token fired. The redirect driver annotates the
    /// message with the number of completed hops.
    #[error("request cancelled: {0}")]
    Cancelled(String),

    /// Redirect limit exceeded, or a redirect arrived under `error` mode.
    #[error("redirect error: {0}")]
    Redirect(String),

    /// The built-in direct client failed.
    #[error("native client error: {0}")]
    Native(String),
}

impl FetchError {
    /// Category label for structured logging.
    pub fn category(&self) -> &'static str {
        match self {
            FetchError::Config(_) => "config",
            FetchError::Proxy(e) => e.category(),
            FetchError::Tls(_) => "tls",
            FetchError::Http(_) => "http",
            FetchError::Decode(_) => "decode",
            FetchError::Cancelled(_) => "cancelled",
            FetchError::Redirect(_) => "redirect",
            FetchError::Native(_) => "native",
        }
    }
}

impl From<ProxyError> for FetchError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::Cancelled(msg) => FetchError::Cancelled(msg),
            other => FetchError::Proxy(other),
        }
    }
}
