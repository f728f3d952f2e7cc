//! Fetch-style HTTP client with transparent SOCKS5 tunneling.
//!
//! The public entry point is [`fetch`], which accepts a [`Request`] and
//! resolves to a fully buffered [`Response`]. When a SOCKS proxy is
//! configured (explicitly or through the `SOCKS5_PROXY` family of
//! environment variables) the request is tunneled through it; otherwise,
//! and for HTTP/HTTPS proxies, the built-in direct client is used. Both
//! paths share redirect handling and content decoding, so callers observe
//! the same semantics either way.
//!
//! Smaller building blocks are exported as library entry points as well:
//! [`convert`] normalizes the proxy URL shapes found in real-world proxy
//! lists, [`parse_proxy_url`] yields a typed [`ProxyEndpoint`], and
//! [`decode_chunked`] decodes HTTP/1.1 chunked transfer-coding.

pub mod core;
pub mod logging;

pub use crate::core::errors::FetchError;
pub use crate::core::fetch::fetch;
pub use crate::core::http::headers::HeaderMap;
pub use crate::core::http::framer::decode_chunked;
pub use crate::core::http::types::{RedirectMode, Request, Response};
pub use crate::core::proxy::convert::{convert, convert_list};
pub use crate::core::proxy::parser::parse_proxy_url;
pub use crate::core::proxy::{ProxyEndpoint, ProxyScheme};
pub use crate::core::tls::TlsOptions;
