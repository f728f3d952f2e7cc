//! Scripted network peers for integration tests.
//!
//! `spawn_socks_server` plays the server side of the SOCKS5 negotiation
//! with configurable replies, then answers the tunneled HTTP request with
//! scripted bytes. Each configured exchange serves exactly one connection,
//! in order, and captures what the client sent for later assertions.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const METHOD_NO_AUTH: u8 = 0x00;
pub const METHOD_USER_PASS: u8 = 0x02;
pub const METHOD_NO_ACCEPTABLE: u8 = 0xFF;

/// Script for one proxied connection.
#[derive(Clone)]
pub struct SocksExchange {
    /// Method byte the server selects.
    pub method_reply: u8,
    /// RFC 1929 reply, when the server selected user/pass auth.
    pub auth_reply: [u8; 2],
    /// REP code in the CONNECT reply.
    pub connect_rep: u8,
    /// Bytes served once the tunnel is up.
    pub http_response: Vec<u8>,
    /// Wrap the tunnel in TLS (self-signed) before HTTP.
    pub tls: bool,
}

impl SocksExchange {
    pub fn plain(http_response: impl Into<Vec<u8>>) -> Self {
        Self {
            method_reply: METHOD_NO_AUTH,
            auth_reply: [0x01, 0x00],
            connect_rep: 0x00,
            http_response: http_response.into(),
            tls: false,
        }
    }

    pub fn with_auth(http_response: impl Into<Vec<u8>>) -> Self {
        Self {
            method_reply: METHOD_USER_PASS,
            ..Self::plain(http_response)
        }
    }

    pub fn with_tls(http_response: impl Into<Vec<u8>>) -> Self {
        Self {
            tls: true,
            ..Self::plain(http_response)
        }
    }
}

/// What the client sent over one proxied connection.
#[derive(Debug, Default)]
pub struct Captured {
    pub offered_methods: Vec<u8>,
    pub auth: Option<(String, String)>,
    pub connect_host: String,
    pub connect_port: u16,
    pub http_request: String,
}

impl Captured {
    pub fn request_line(&self) -> &str {
        self.http_request.split("\r\n").next().unwrap_or("")
    }

    pub fn header(&self, name: &str) -> Option<String> {
        let lower = format!("{}:", name.to_ascii_lowercase());
        self.http_request.split("\r\n").find_map(|line| {
            let (n, v) = line.split_once(':')?;
            if format!("{}:", n.to_ascii_lowercase()) == lower {
                Some(v.trim().to_string())
            } else {
                None
            }
        })
    }

    pub fn body(&self) -> &str {
        self.http_request
            .split_once("\r\n\r\n")
            .map(|(_, body)| body)
            .unwrap_or("")
    }
}

/// Serve `exchanges.len()` connections, one exchange each, and return what
/// the client sent. The handle resolves once every exchange is done.
pub async fn spawn_socks_server(
    exchanges: Vec<SocksExchange>,
) -> (SocketAddr, JoinHandle<Result<Vec<Captured>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        let tls_config = server_tls_config();
        let mut captured = Vec::new();
        for exchange in exchanges {
            let (stream, _) = listener.accept().await.context("accept")?;
            captured.push(serve_one(stream, &exchange, &tls_config).await?);
        }
        Ok(captured)
    });
    (addr, handle)
}

async fn serve_one(
    mut stream: TcpStream,
    exchange: &SocksExchange,
    tls_config: &Arc<rustls::ServerConfig>,
) -> Result<Captured> {
    let mut captured = Captured::default();

    // Method selection.
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await.context("greeting")?;
    if head[0] != 0x05 {
        bail!("unexpected SOCKS version {:#x}", head[0]);
    }
    let mut methods = vec![0u8; head[1] as usize];
    stream.read_exact(&mut methods).await.context("methods")?;
    captured.offered_methods = methods;
    stream
        .write_all(&[0x05, exchange.method_reply])
        .await
        .context("method reply")?;
    if exchange.method_reply == METHOD_NO_ACCEPTABLE {
        return Ok(captured);
    }

    // RFC 1929 sub-negotiation.
    if exchange.method_reply == METHOD_USER_PASS {
        let mut ver_ulen = [0u8; 2];
        stream.read_exact(&mut ver_ulen).await.context("auth head")?;
        let mut user = vec![0u8; ver_ulen[1] as usize];
        stream.read_exact(&mut user).await.context("auth user")?;
        let mut plen = [0u8; 1];
        stream.read_exact(&mut plen).await.context("auth plen")?;
        let mut pass = vec![0u8; plen[0] as usize];
        stream.read_exact(&mut pass).await.context("auth pass")?;
        captured.auth = Some((
            String::from_utf8_lossy(&user).into_owned(),
            String::from_utf8_lossy(&pass).into_owned(),
        ));
        stream
            .write_all(&exchange.auth_reply)
            .await
            .context("auth reply")?;
        if exchange.auth_reply[1] != 0x00 {
            return Ok(captured);
        }
    }

    // CONNECT.
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await.context("connect head")?;
    match head[3] {
        0x01 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await.context("connect v4")?;
            captured.connect_host = format!("{}.{}.{}.{}", addr[0], addr[1], addr[2], addr[3]);
        }
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await.context("domain len")?;
            let mut name = vec![0u8; len[0] as usize];
            stream.read_exact(&mut name).await.context("domain")?;
            captured.connect_host = String::from_utf8_lossy(&name).into_owned();
        }
        other => bail!("unexpected ATYP {other:#x}"),
    }
    let mut port = [0u8; 2];
    stream.read_exact(&mut port).await.context("connect port")?;
    captured.connect_port = u16::from_be_bytes(port);

    stream
        .write_all(&[0x05, exchange.connect_rep, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
        .await
        .context("connect reply")?;
    if exchange.connect_rep != 0x00 {
        return Ok(captured);
    }
    // Dialer-only exchanges script no HTTP bytes; the client hangs up once
    // the tunnel is established.
    if exchange.http_response.is_empty() && !exchange.tls {
        return Ok(captured);
    }

    // Tunnel payload: optionally TLS, then one scripted HTTP exchange.
    if exchange.tls {
        let acceptor = tokio_rustls::TlsAcceptor::from(tls_config.clone());
        let mut tls_stream = acceptor.accept(stream).await.context("server tls")?;
        captured.http_request = read_http_request(&mut tls_stream).await?;
        tls_stream
            .write_all(&exchange.http_response)
            .await
            .context("tls response")?;
        tls_stream.shutdown().await.ok();
    } else {
        captured.http_request = read_http_request(&mut stream).await?;
        stream
            .write_all(&exchange.http_response)
            .await
            .context("response")?;
        stream.shutdown().await.ok();
    }
    Ok(captured)
}

/// Read one HTTP/1.1 request: head through `CRLFCRLF`, then a
/// `Content-Length` body when present.
async fn read_http_request<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S) -> Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.context("read request")?;
        if n == 0 {
            bail!("peer closed before request head");
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let content_length: usize = head
        .split("\r\n")
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse().ok())?
        })
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = stream.read(&mut chunk).await.context("read body")?;
        if n == 0 {
            bail!("peer closed mid-body");
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Self-signed server config for `example.test`.
pub fn server_tls_config() -> Arc<rustls::ServerConfig> {
    let cert = rcgen::generate_simple_self_signed(vec!["example.test".to_string()])
        .expect("generate cert");
    let cert_der = cert.serialize_der().expect("serialize cert");
    let key_der = cert.serialize_private_key_der();
    let config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(
            vec![rustls::Certificate(cert_der)],
            rustls::PrivateKey(key_der),
        )
        .expect("server config");
    Arc::new(config)
}

/// Plain HTTP server for the direct (fallback) path: one scripted response
/// per accepted connection.
pub async fn spawn_http_server(
    responses: Vec<Vec<u8>>,
) -> (SocketAddr, JoinHandle<Result<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        let mut captured = Vec::new();
        for response in responses {
            let (mut stream, _) = listener.accept().await.context("accept")?;
            captured.push(read_http_request(&mut stream).await?);
            stream.write_all(&response).await.context("response")?;
            stream.shutdown().await.ok();
        }
        Ok(captured)
    });
    (addr, handle)
}

/// Chunked-encode `data` as a single chunk plus terminator.
pub fn chunked(data: &[u8]) -> Vec<u8> {
    let mut out = format!("{:x}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n0\r\n\r\n");
    out
}

pub fn http_response(status_line: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("{status_line}\r\n").into_bytes();
    for (name, value) in headers {
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}
