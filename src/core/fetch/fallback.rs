//! Direct (non-proxied) engine built on hyper's connection API.
//!
//! Used when no SOCKS proxy applies: no proxy configured, an HTTP/HTTPS
//! proxy delegated away, or an invalid proxy downgraded. The connection is
//! opened manually so TLS uses the same rustls configuration as the tunnel
//! path, then handed to hyper for HTTP/1.1 framing. Content decoding and
//! redirects still happen in the shared layers, so both engines present
//! identical semantics.

use std::time::Duration;

use hyper::body::HttpBody as _;
use hyper::header::{HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, CONNECTION, HOST};
use hyper::{Body, Version};
use rustls::ServerName;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use crate::core::errors::FetchError;
use crate::core::http::client::ProxyStream;
use crate::core::http::decoder;
use crate::core::http::framer::{DEFAULT_ACCEPT, DEFAULT_ACCEPT_ENCODING};
use crate::core::http::headers::HeaderMap;
use crate::core::http::redirect::Hop;
use crate::core::http::types::{Response, TargetEndpoint};
use crate::core::tls::{create_client_config, TlsOptions};

pub(crate) async fn send_direct(
    hop: &Hop,
    tls: &TlsOptions,
    connect_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Response, FetchError> {
    let target = TargetEndpoint::from_url(&hop.url)?;
    if cancel.is_cancelled() {
        return Err(FetchError::Cancelled("request aborted before send".into()));
    }

    let tcp = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(FetchError::Cancelled("request aborted during connect".into()))
        }
        result = timeout(
            connect_timeout,
            TcpStream::connect((target.host.as_str(), target.port)),
        ) => match result {
            Err(_) => {
                return Err(FetchError::Native(format!(
                    "connect to {}:{} timed out after {connect_timeout:?}",
                    target.host, target.port
                )))
            }
            Ok(Err(e)) => {
                return Err(FetchError::Native(format!(
                    "connect to {}:{} failed: {e}",
                    target.host, target.port
                )))
            }
            Ok(Ok(stream)) => stream,
        },
    };

    let stream = if target.scheme.is_tls() {
        let server_name = ServerName::try_from(target.host.as_str())
            .map_err(|_| FetchError::Tls(format!("invalid server name '{}'", target.host)))?;
        let connector = TlsConnector::from(create_client_config(tls));
        let tls_stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(FetchError::Cancelled(
                    "request aborted during tls handshake".into(),
                ))
            }
            result = connector.connect(server_name, tcp) => {
                result.map_err(|e| FetchError::Tls(e.to_string()))?
            }
        };
        ProxyStream::Tls(Box::new(tls_stream))
    } else {
        ProxyStream::Plain(tcp)
    };

    let (mut sender, conn) = hyper::client::conn::handshake(stream)
        .await
        .map_err(|e| FetchError::Native(format!("http handshake: {e}")))?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(target = "http", "direct connection ended: {e:?}");
        }
    });

    let request = build_request(hop, &target)?;
    let mut resp = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(FetchError::Cancelled("request aborted while sending".into()))
        }
        result = sender.send_request(request) => {
            result.map_err(|e| FetchError::Native(format!("send request: {e}")))?
        }
    };

    let status = resp.status().as_u16();
    let status_text = resp
        .status()
        .canonical_reason()
        .unwrap_or("")
        .to_string();
    let mut headers = HeaderMap::new();
    for (name, value) in resp.headers() {
        if let Ok(value) = value.to_str() {
            headers.append(name.as_str(), value);
        }
    }

    let mut body = Vec::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(FetchError::Cancelled(
                    "request aborted while reading response".into(),
                ))
            }
            chunk = resp.body_mut().data() => chunk,
        };
        match next {
            None => break,
            Some(Ok(chunk)) => body.extend_from_slice(&chunk),
            Some(Err(e)) => return Err(FetchError::Native(format!("read body: {e}"))),
        }
    }

    let body = decoder::decode_body(&mut headers, body)?;
    tracing::debug!(
        target = "http",
        status,
        body_bytes = body.len(),
        url = %hop.url,
        "direct request complete"
    );
    Ok(Response {
        status,
        status_text,
        headers,
        body,
    })
}

fn build_request(hop: &Hop, target: &TargetEndpoint) -> Result<hyper::Request<Body>, FetchError> {
    let mut builder = hyper::Request::builder()
        .method(hop.method.as_str())
        .uri(target.path_and_query.as_str())
        .version(Version::HTTP_11);

    if let Some(headers) = builder.headers_mut() {
        for (name, value) in hop.headers.iter() {
            if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("connection") {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name),
                HeaderValue::try_from(value),
            ) {
                headers.append(name, value);
            }
        }
        let host = HeaderValue::from_str(&target.host_header())
            .unwrap_or_else(|_| HeaderValue::from_static(""));
        headers.insert(HOST, host);
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        }
        if !headers.contains_key(ACCEPT_ENCODING) {
            headers.insert(
                ACCEPT_ENCODING,
                HeaderValue::from_static(DEFAULT_ACCEPT_ENCODING),
            );
        }
    }

    let body = match &hop.body {
        Some(bytes) => Body::from(bytes.clone()),
        None => Body::empty(),
    };
    builder
        .body(body)
        .map_err(|e| FetchError::Config(format!("invalid request: {e}")))
}
