//! Request engine: one request, one fresh connection.
//!
//! The tunnel path dials the target through the SOCKS5 proxy, optionally
//! promotes the stream to TLS with the target host as SNI, writes a raw
//! HTTP/1.1 request and accumulates the framed response. The direct path
//! delegates to the hyper-based fallback engine. Either way the stream is
//! owned by this one request and dropped on every exit path.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use rustls::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;

use crate::core::errors::FetchError;
use crate::core::fetch::fallback;
use crate::core::http::decoder;
use crate::core::http::framer::{self, BodyFraming};
use crate::core::http::redirect::Hop;
use crate::core::http::types::{Response, TargetEndpoint};
use crate::core::proxy::socks5::HANDSHAKE_TIMEOUT;
use crate::core::proxy::{ProxyEndpoint, Socks5Dialer};
use crate::core::tls::{create_client_config, TlsOptions};

/// Byte stream to the target: raw TCP or TLS-wrapped.
pub(crate) enum ProxyStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for ProxyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ProxyStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ProxyStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ProxyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            ProxyStream::Plain(s) => Pin::new(s).poll_write(cx, data),
            ProxyStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, data),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ProxyStream::Plain(s) => Pin::new(s).poll_flush(cx),
            ProxyStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ProxyStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ProxyStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// How the engine reaches the target.
pub(crate) enum Transport {
    Direct,
    Socks5(ProxyEndpoint),
}

/// Per-request client configuration shared by every redirect hop.
pub(crate) struct HttpClient {
    transport: Transport,
    tls: TlsOptions,
    resolve_dns_locally: bool,
    timeout: Duration,
}

impl HttpClient {
    pub(crate) fn direct(tls: TlsOptions) -> Self {
        Self {
            transport: Transport::Direct,
            tls,
            resolve_dns_locally: false,
            timeout: HANDSHAKE_TIMEOUT,
        }
    }

    pub(crate) fn socks5(
        endpoint: ProxyEndpoint,
        tls: TlsOptions,
        resolve_dns_locally: bool,
    ) -> Self {
        Self {
            transport: Transport::Socks5(endpoint),
            tls,
            resolve_dns_locally,
            timeout: HANDSHAKE_TIMEOUT,
        }
    }

    pub(crate) async fn send(
        &self,
        hop: &Hop,
        cancel: &CancellationToken,
    ) -> Result<Response, FetchError> {
        match &self.transport {
            Transport::Direct => fallback::send_direct(hop, &self.tls, self.timeout, cancel).await,
            Transport::Socks5(endpoint) => self.send_tunneled(endpoint, hop, cancel).await,
        }
    }

    async fn send_tunneled(
        &self,
        endpoint: &ProxyEndpoint,
        hop: &Hop,
        cancel: &CancellationToken,
    ) -> Result<Response, FetchError> {
        let target = TargetEndpoint::from_url(&hop.url)?;
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled("request aborted before send".into()));
        }

        let dialer = Socks5Dialer::new(endpoint.clone(), self.resolve_dns_locally, self.timeout);
        let tcp = dialer.connect(&target.host, target.port, cancel).await?;

        let mut stream = if target.scheme.is_tls() {
            let server_name = ServerName::try_from(target.host.as_str())
                .map_err(|_| FetchError::Tls(format!("invalid server name '{}'", target.host)))?;
            let connector = TlsConnector::from(create_client_config(&self.tls));
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

        let request_bytes =
            framer::format_request(&hop.method, &target, &hop.headers, hop.body.as_deref());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(FetchError::Cancelled("request aborted while sending".into()))
            }
            result = stream.write_all(&request_bytes) => {
                result.map_err(|e| FetchError::Http(format!("failed to write request: {e}")))?
            }
        }

        let (head, body) = self.read_response(&mut stream, cancel).await?;
        let mut head = head;
        let body = decoder::decode_body(&mut head.headers, body)?;

        tracing::debug!(
            target = "http",
            status = head.status,
            body_bytes = body.len(),
            url = %hop.url,
            "tunnel request complete"
        );
        Ok(Response {
            status: head.status,
            status_text: head.status_text,
            headers: head.headers,
            body,
        })
    }

    /// Accumulate response bytes until the framing rule declares the body
    /// complete, or the peer closes the connection.
    async fn read_response(
        &self,
        stream: &mut ProxyStream,
        cancel: &CancellationToken,
    ) -> Result<(framer::ResponseHead, Vec<u8>), FetchError> {
        let mut buf: Vec<u8> = Vec::with_capacity(8192);
        let mut chunk = [0u8; 8192];
        let mut header_end: Option<usize> = None;
        let mut head: Option<framer::ResponseHead> = None;
        let mut framing = BodyFraming::ReadToEof;

        loop {
            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(FetchError::Cancelled(
                        "request aborted while reading response".into(),
                    ))
                }
                result = stream.read(&mut chunk) => {
                    result.map_err(|e| FetchError::Http(format!("failed to read response: {e}")))?
                }
            };
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            if header_end.is_none() {
                if let Some(end) = framer::find_header_end(&buf) {
                    let parsed = framer::parse_head(&buf[..end]);
                    framing = framer::body_framing(&parsed.headers);
                    head = Some(parsed);
                    header_end = Some(end);
                }
            }
            if let Some(end) = header_end {
                let done = match framing {
                    BodyFraming::ContentLength(len) => buf.len() - end >= len,
                    BodyFraming::Chunked => framer::scan_chunked(&buf[end..]).1,
                    BodyFraming::ReadToEof => false,
                };
                if done {
                    break;
                }
            }
        }

        let (end, head) = match (header_end, head) {
            (Some(end), Some(head)) => (end, head),
            _ => {
                return Err(FetchError::Http(
                    "connection closed before response headers".into(),
                ))
            }
        };
        let raw_body = &buf[end..];
        let body = match framing {
            BodyFraming::ContentLength(len) => raw_body[..raw_body.len().min(len)].to_vec(),
            BodyFraming::Chunked => framer::scan_chunked(raw_body).0,
            BodyFraming::ReadToEof => raw_body.to_vec(),
        };
        Ok((head, body))
    }
}
