//! Redirect driver wrapping the request engine.
//!
//! Implements the fetch redirect modes and the RFC method/body rewrites:
//! 303 always becomes a bodiless GET, 301/302 become GET unless the method
//! already was GET or HEAD, 307/308 preserve both. Credentialed headers are
//! scrubbed when a hop leaves the original origin, and `Referer` tracks the
//! previous hop unless the caller pinned one. The caller's request is never
//! mutated; every hop is a fresh derivation.

use url::Url;

use crate::core::errors::FetchError;
use crate::core::http::client::HttpClient;
use crate::core::http::headers::HeaderMap;
use crate::core::http::types::{RedirectMode, Request, Response};
use tokio_util::sync::CancellationToken;

pub(crate) const MAX_REDIRECTS: u32 = 20;

const SENSITIVE_HEADERS: [&str; 3] = ["authorization", "cookie", "proxy-authorization"];

/// One request derivation in a redirect chain.
#[derive(Debug, Clone)]
pub(crate) struct Hop {
    pub method: String,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

pub(crate) async fn run(
    client: &HttpClient,
    req: &Request,
    cancel: &CancellationToken,
) -> Result<Response, FetchError> {
    let url = Url::parse(&req.url)
        .map_err(|e| FetchError::Config(format!("invalid request URL '{}': {e}", req.url)))?;
    let hop = Hop {
        method: req.method.clone(),
        url,
        headers: req.headers.clone(),
        body: req.body.clone(),
    };

    match req.redirect {
        RedirectMode::Manual => client.send(&hop, cancel).await,
        RedirectMode::Error => {
            let resp = client.send(&hop, cancel).await?;
            match redirect_location(&resp, false) {
                Some(location) => Err(FetchError::Redirect(format!(
                    "redirect to '{location}' requested but redirect mode is 'error'"
                ))),
                None => Ok(resp),
            }
        }
        RedirectMode::Follow => follow(client, hop, cancel).await,
    }
}

async fn follow(
    client: &HttpClient,
    mut hop: Hop,
    cancel: &CancellationToken,
) -> Result<Response, FetchError> {
    let original_origin = origin_of(&hop.url);
    let caller_set_referer = hop.headers.contains("referer");
    let mut hops: u32 = 0;

    loop {
        let resp = match client.send(&hop, cancel).await {
            Ok(resp) => resp,
            Err(FetchError::Cancelled(msg)) => {
                return Err(FetchError::Cancelled(format!(
                    "{msg} ({hops} redirect(s) completed)"
                )))
            }
            Err(err) => return Err(err),
        };

        let Some(location) = redirect_location(&resp, true) else {
            return Ok(resp);
        };
        if hops >= MAX_REDIRECTS {
            return Err(FetchError::Redirect(format!(
                "maximum redirects ({MAX_REDIRECTS}) exceeded"
            )));
        }
        hops += 1;

        let next_url = resolve_location(&hop.url, &location)?;
        let had_body = hop.body.is_some();
        let (method, body) = rewrite_method_body(resp.status, &hop.method, hop.body.take());
        let body_dropped = had_body && body.is_none();

        let mut headers = hop.headers.clone();
        if body_dropped {
            headers.remove("content-length");
            headers.remove("content-type");
        }
        if origin_of(&next_url) != original_origin {
            for name in SENSITIVE_HEADERS {
                headers.remove(name);
            }
        }
        if !caller_set_referer {
            headers.set("Referer", hop.url.to_string());
        }

        tracing::debug!(
            target = "http",
            status = resp.status,
            location = %location,
            hop = hops,
            method = %method,
            body_dropped,
            "following redirect"
        );
        hop = Hop {
            method,
            url: next_url,
            headers,
            body,
        };
    }
}

/// `Location` of a redirect response, or `None` when the response should be
/// returned to the caller. `followable_only` restricts to the five statuses
/// the follow loop handles; `error` mode flags any 3xx.
fn redirect_location(resp: &Response, followable_only: bool) -> Option<String> {
    let status_matches = if followable_only {
        matches!(resp.status, 301 | 302 | 303 | 307 | 308)
    } else {
        (300..400).contains(&resp.status)
    };
    if !status_matches {
        return None;
    }
    resp.headers
        .get("location")
        .filter(|l| !l.is_empty())
        .map(str::to_string)
}

/// Absolute http(s) locations are taken as-is; everything else resolves
/// against the current URL with standard reference semantics.
fn resolve_location(current: &Url, location: &str) -> Result<Url, FetchError> {
    let resolved = if location.starts_with("http://") || location.starts_with("https://") {
        Url::parse(location)
    } else {
        current.join(location)
    };
    resolved.map_err(|e| FetchError::Redirect(format!("invalid Location '{location}': {e}")))
}

fn rewrite_method_body(
    status: u16,
    method: &str,
    body: Option<Vec<u8>>,
) -> (String, Option<Vec<u8>>) {
    let upper = method.to_ascii_uppercase();
    match status {
        303 => ("GET".to_string(), None),
        301 | 302 if upper != "GET" && upper != "HEAD" => ("GET".to_string(), None),
        _ => (method.to_string(), body),
    }
}

fn origin_of(url: &Url) -> (String, String, u16) {
    (
        url.scheme().to_ascii_lowercase(),
        url.host_str().unwrap_or("").to_ascii_lowercase(),
        url.port_or_known_default().unwrap_or(0),
    )
}
