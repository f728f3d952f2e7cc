//! Front door: proxy selection and dispatch.
//!
//! The proxy comes from the request, else from the first nonempty proxy
//! environment variable, else the request goes direct. SOCKS proxies drive
//! the tunnel engine; HTTP/HTTPS proxies and broken proxy configuration
//! downgrade to the direct client (with a warning for the latter), never to
//! a caller-visible failure.

pub(crate) mod fallback;

use crate::core::errors::FetchError;
use crate::core::http::client::HttpClient;
use crate::core::http::redirect;
use crate::core::http::types::{Request, Response};
use crate::core::proxy::convert::convert;
use crate::core::proxy::parser::parse_proxy_url;

/// Proxy environment variables, in lookup order. First nonempty wins.
pub const PROXY_ENV_VARS: [&str; 4] = [
    "SOCKS5_PROXY",
    "SOCKS_PROXY",
    "HTTP_PROXY",
    "HTTPS_PROXY",
];

/// Issue a request and resolve to a fully decoded response.
///
/// Drop-in fetch semantics: redirects are followed (per
/// [`crate::RedirectMode`]), the body is buffered, content decoding is
/// applied, and cancellation is honored at every suspension point.
pub async fn fetch(req: Request) -> Result<Response, FetchError> {
    let cancel = req.cancel.clone().unwrap_or_default();
    let client = select_client(&req);
    redirect::run(&client, &req, &cancel).await
}

fn select_client(req: &Request) -> HttpClient {
    let raw = match req
        .proxy
        .clone()
        .filter(|p| !p.trim().is_empty())
        .or_else(proxy_from_env)
    {
        Some(raw) => raw,
        None => return HttpClient::direct(req.tls.clone()),
    };

    match convert(&raw).and_then(|canonical| parse_proxy_url(&canonical)) {
        Err(err) => {
            tracing::warn!(
                target = "fetch",
                error = %err,
                "invalid proxy configuration, falling back to direct client"
            );
            HttpClient::direct(req.tls.clone())
        }
        Ok(endpoint) if !endpoint.scheme.is_socks() => {
            tracing::debug!(
                target = "fetch",
                scheme = %endpoint.scheme,
                "HTTP proxy delegated to direct client"
            );
            HttpClient::direct(req.tls.clone())
        }
        Ok(endpoint) => {
            tracing::debug!(
                target = "fetch",
                proxy.url = %endpoint.sanitized(),
                "using SOCKS tunnel"
            );
            HttpClient::socks5(endpoint, req.tls.clone(), req.resolve_dns_locally)
        }
    }
}

fn proxy_from_env() -> Option<String> {
    proxy_from_env_with(|name| std::env::var(name).ok())
}

/// Env scan with an injectable lookup, so the precedence is testable
/// without touching process state.
pub(crate) fn proxy_from_env_with(get: impl Fn(&str) -> Option<String>) -> Option<String> {
    PROXY_ENV_VARS
        .iter()
        .find_map(|name| get(name).filter(|value| !value.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn env_scan_prefers_socks5_proxy() {
        let vars = env(&[
            ("HTTP_PROXY", "http://h:8080"),
            ("SOCKS5_PROXY", "socks5://s:1080"),
        ]);
        let found = proxy_from_env_with(|name| vars.get(name).cloned());
        assert_eq!(found.as_deref(), Some("socks5://s:1080"));
    }

    #[test]
    fn env_scan_skips_empty_values() {
        let vars = env(&[("SOCKS5_PROXY", ""), ("SOCKS_PROXY", "socks5://s:1080")]);
        let found = proxy_from_env_with(|name| vars.get(name).cloned());
        assert_eq!(found.as_deref(), Some("socks5://s:1080"));
    }

    #[test]
    fn env_scan_falls_through_in_order() {
        let vars = env(&[("HTTPS_PROXY", "https://h:8443")]);
        let found = proxy_from_env_with(|name| vars.get(name).cloned());
        assert_eq!(found.as_deref(), Some("https://h:8443"));

        let found = proxy_from_env_with(|_| None);
        assert!(found.is_none());
    }
}
