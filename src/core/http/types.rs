use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::errors::FetchError;
use crate::core::http::headers::HeaderMap;
use crate::core::tls::TlsOptions;

/// Redirect handling mode, mirroring fetch semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectMode {
    /// Follow redirects up to the hop limit (default).
    Follow,
    /// Return the redirect response untouched.
    Manual,
    /// Fail when a redirect is requested.
    Error,
}

impl Default for RedirectMode {
    fn default() -> Self {
        Self::Follow
    }
}

impl std::fmt::Display for RedirectMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Follow => write!(f, "follow"),
            Self::Manual => write!(f, "manual"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A fetch request. Plain fields; the convenience constructors only fill in
/// the common cases.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: HeaderMap,
    /// Fully buffered request body; requests never stream.
    pub body: Option<Vec<u8>>,
    /// Proxy identifier in any shape the normalizer accepts. `None` falls
    /// back to the proxy environment variables, then to a direct request.
    pub proxy: Option<String>,
    pub redirect: RedirectMode,
    pub tls: TlsOptions,
    /// Resolve the target hostname locally and send an IPv4 address in the
    /// SOCKS5 CONNECT request instead of the hostname.
    pub resolve_dns_locally: bool,
    pub cancel: Option<CancellationToken>,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            url: String::new(),
            headers: HeaderMap::new(),
            body: None,
            proxy: None,
            redirect: RedirectMode::default(),
            tls: TlsOptions::default(),
            resolve_dns_locally: false,
            cancel: None,
        }
    }
}

impl Request {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url)
    }

    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            body: Some(body),
            ..Default::default()
        }
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as lossy UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TargetScheme {
    Http,
    Https,
}

impl TargetScheme {
    pub(crate) fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }

    pub(crate) fn is_tls(self) -> bool {
        matches!(self, Self::Https)
    }
}

/// Connection target derived from the request URL.
#[derive(Debug, Clone)]
pub(crate) struct TargetEndpoint {
    pub scheme: TargetScheme,
    /// Host with IPv6 brackets stripped.
    pub host: String,
    pub port: u16,
    pub path_and_query: String,
}

impl TargetEndpoint {
    pub(crate) fn from_url(url: &Url) -> Result<Self, FetchError> {
        let scheme = match url.scheme() {
            "http" => TargetScheme::Http,
            "https" => TargetScheme::Https,
            other => {
                return Err(FetchError::Config(format!(
                    "unsupported URL scheme '{other}'"
                )))
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| FetchError::Config(format!("URL '{url}' has no host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url.port().unwrap_or_else(|| scheme.default_port());

        let mut path_and_query = url.path().to_string();
        if path_and_query.is_empty() {
            path_and_query.push('/');
        }
        if let Some(query) = url.query() {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }

        Ok(Self {
            scheme,
            host,
            port,
            path_and_query,
        })
    }

    /// `Host` header value: bracketed for IPv6 literals, port only when
    /// non-default for the scheme.
    pub(crate) fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == self.scheme.default_port() {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_mode_defaults_to_follow() {
        assert_eq!(RedirectMode::default(), RedirectMode::Follow);
    }

    #[test]
    fn redirect_mode_serialization() {
        assert_eq!(
            serde_json::to_string(&RedirectMode::Manual).unwrap(),
            "\"manual\""
        );
        let mode: RedirectMode = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(mode, RedirectMode::Error);
    }

    #[test]
    fn request_defaults() {
        let req = Request::new("https://example.test/");
        assert_eq!(req.method, "GET");
        assert_eq!(req.redirect, RedirectMode::Follow);
        assert!(req.tls.verify_peer);
        assert!(req.body.is_none());
    }

    #[test]
    fn response_ok_covers_2xx() {
        let mut resp = Response {
            status: 204,
            status_text: "No Content".into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        };
        assert!(resp.ok());
        resp.status = 302;
        assert!(!resp.ok());
    }

    #[test]
    fn target_from_url_defaults_ports() {
        let url = Url::parse("https://example.test/a?b=c").unwrap();
        let t = TargetEndpoint::from_url(&url).unwrap();
        assert_eq!(t.port, 443);
        assert!(t.scheme.is_tls());
        assert_eq!(t.path_and_query, "/a?b=c");
        assert_eq!(t.host_header(), "example.test");
    }

    #[test]
    fn target_host_header_includes_non_default_port() {
        let url = Url::parse("http://example.test:8080/").unwrap();
        let t = TargetEndpoint::from_url(&url).unwrap();
        assert_eq!(t.host_header(), "example.test:8080");
    }

    #[test]
    fn target_strips_ipv6_brackets_and_rebrackets_host_header() {
        let url = Url::parse("http://[2001:db8::1]:8080/x").unwrap();
        let t = TargetEndpoint::from_url(&url).unwrap();
        assert_eq!(t.host, "2001:db8::1");
        assert_eq!(t.host_header(), "[2001:db8::1]:8080");
    }

    #[test]
    fn target_rejects_non_http_schemes() {
        let url = Url::parse("ftp://example.test/").unwrap();
        assert!(TargetEndpoint::from_url(&url).is_err());
    }
}
