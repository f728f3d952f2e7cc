//! SOCKS5 dialer (RFC 1928) with username/password authentication (RFC 1929).
//!
//! The negotiation runs as a short sequence of awaits over the proxy TCP
//! stream: method selection, optional auth sub-negotiation, CONNECT, reply.
//! Any unexpected byte fails the dial and drops the socket. Only address
//! types 0x01 (IPv4) and 0x03 (domain) are emitted; the command is always
//! CONNECT.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::{timeout_at, Instant as Deadline};
use tokio_util::sync::CancellationToken;

use super::errors::ProxyError;
use super::ProxyEndpoint;

pub const SOCKS5_VERSION: u8 = 0x05;

pub const AUTH_NO_AUTH: u8 = 0x00;
pub const AUTH_USERNAME_PASSWORD: u8 = 0x02;
pub const AUTH_SUBNEG_VERSION: u8 = 0x01;

pub const CMD_CONNECT: u8 = 0x01;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

pub const REP_SUCCESS: u8 = 0x00;

/// Dead-peer deadline covering TCP connect and the first reply from the
/// proxy. Cleared once the proxy has answered the method selection.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Negotiation phase, used to label protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Handshake,
    Auth,
    Connect,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Handshake => "handshake",
            Phase::Auth => "auth",
            Phase::Connect => "connect",
        }
    }
}

/// SOCKS5 dialer: opens a TCP tunnel to a target through a proxy endpoint.
pub struct Socks5Dialer {
    endpoint: ProxyEndpoint,
    resolve_locally: bool,
    timeout: Duration,
}

impl Socks5Dialer {
    /// `resolve_locally` makes the dialer resolve the target hostname to an
    /// IPv4 address itself instead of delegating resolution to the proxy.
    pub fn new(endpoint: ProxyEndpoint, resolve_locally: bool, timeout: Duration) -> Self {
        Self {
            endpoint,
            resolve_locally,
            timeout,
        }
    }

    /// Run the full negotiation and return a transparent byte pipe to
    /// `host:port`. The cancellation token is honored at every await; on
    /// cancellation the socket is dropped and a `Cancelled` error returned.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<TcpStream, ProxyError> {
        if cancel.is_cancelled() {
            return Err(ProxyError::cancelled("request aborted before connect"));
        }
        let start = Instant::now();
        tracing::debug!(
            proxy.url = %self.endpoint.sanitized(),
            target.host = %host,
            target.port = port,
            timeout_secs = self.timeout.as_secs(),
            "attempting SOCKS5 tunnel"
        );

        // One idle deadline spans resolution, TCP connect and the wait for
        // the proxy's first reply; it is not reset between those steps.
        let deadline = Deadline::now() + self.timeout;
        let mut stream =
            cancellable(cancel, "proxy connect", self.open_proxy_connection(deadline)).await?;

        let method = cancellable(
            cancel,
            "method selection",
            self.negotiate_method(&mut stream, deadline),
        )
        .await?;

        match method {
            AUTH_NO_AUTH => {}
            AUTH_USERNAME_PASSWORD if self.endpoint.has_credentials() => {
                cancellable(cancel, "authentication", self.authenticate(&mut stream)).await?;
            }
            other => {
                return Err(ProxyError::auth_required(format!(
                    "no acceptable authentication methods (proxy chose 0x{other:02x})"
                )));
            }
        }

        cancellable(
            cancel,
            "connect request",
            self.send_connect_request(&mut stream, host, port),
        )
        .await?;
        cancellable(
            cancel,
            "connect reply",
            self.read_connect_reply(&mut stream),
        )
        .await?;

        tracing::info!(
            proxy.url = %self.endpoint.sanitized(),
            target.host = %host,
            target.port = port,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "SOCKS5 tunnel established"
        );
        Ok(stream)
    }

    async fn open_proxy_connection(&self, deadline: Deadline) -> Result<TcpStream, ProxyError> {
        let addr = self.resolve_proxy_addr().await?;
        match timeout_at(deadline, TcpStream::connect(addr)).await {
            Err(_) => Err(ProxyError::timeout(format!(
                "handshake deadline ({:?}) expired while connecting to the proxy",
                self.timeout
            ))),
            Ok(Err(e)) => Err(ProxyError::unreachable(format!(
                "failed to connect to proxy: {e}"
            ))),
            Ok(Ok(stream)) => Ok(stream),
        }
    }

    async fn resolve_proxy_addr(&self) -> Result<SocketAddr, ProxyError> {
        let host = self.endpoint.host.as_str();
        let mut addrs = lookup_host((host, self.endpoint.port)).await.map_err(|e| {
            ProxyError::host_not_found(format!("proxy host '{host}' did not resolve: {e}"))
        })?;
        addrs.next().ok_or_else(|| {
            ProxyError::host_not_found(format!("no addresses resolved for proxy '{host}'"))
        })
    }

    /// Send the method-selection message and return the proxy's choice.
    /// The reply read runs against the remainder of the handshake deadline
    /// started at connect time; the first bytes from the proxy clear it.
    async fn negotiate_method(
        &self,
        stream: &mut TcpStream,
        deadline: Deadline,
    ) -> Result<u8, ProxyError> {
        let mut methods = vec![AUTH_NO_AUTH];
        if self.endpoint.has_credentials() {
            methods.push(AUTH_USERNAME_PASSWORD);
        }
        let mut request = vec![SOCKS5_VERSION, methods.len() as u8];
        request.extend_from_slice(&methods);
        stream.write_all(&request).await.map_err(|e| {
            ProxyError::unreachable(format!("failed to send method selection: {e}"))
        })?;

        let mut reply = [0u8; 2];
        match timeout_at(deadline, stream.read_exact(&mut reply)).await {
            Err(_) => {
                return Err(ProxyError::timeout(format!(
                    "handshake deadline ({:?}) expired before the proxy's first reply",
                    self.timeout
                )))
            }
            Ok(Err(e)) => {
                return Err(ProxyError::unreachable(format!(
                    "failed to read method selection reply: {e}"
                )))
            }
            Ok(Ok(_)) => {}
        }

        if reply[0] != SOCKS5_VERSION {
            return Err(protocol(
                Phase::Handshake,
                format!("expected SOCKS version 0x05, got 0x{:02x}", reply[0]),
            ));
        }
        tracing::debug!(target = "proxy", method = reply[1], "proxy chose auth method");
        Ok(reply[1])
    }

    /// RFC 1929 username/password sub-negotiation.
    async fn authenticate(&self, stream: &mut TcpStream) -> Result<(), ProxyError> {
        let user = self.endpoint.username.as_bytes();
        let pass = self.endpoint.password.as_bytes();
        if user.len() > 255 {
            return Err(ProxyError::config("username too long (max 255 bytes)"));
        }
        if pass.len() > 255 {
            return Err(ProxyError::config("password too long (max 255 bytes)"));
        }

        let mut request = vec![AUTH_SUBNEG_VERSION, user.len() as u8];
        request.extend_from_slice(user);
        request.push(pass.len() as u8);
        request.extend_from_slice(pass);
        stream
            .write_all(&request)
            .await
            .map_err(|e| ProxyError::unreachable(format!("failed to send authentication: {e}")))?;

        let mut reply = [0u8; 2];
        stream.read_exact(&mut reply).await.map_err(|e| {
            ProxyError::unreachable(format!("failed to read authentication reply: {e}"))
        })?;

        if reply[0] != AUTH_SUBNEG_VERSION {
            return Err(protocol(
                Phase::Auth,
                format!(
                    "expected sub-negotiation version 0x01, got 0x{:02x}",
                    reply[0]
                ),
            ));
        }
        if reply[1] != 0x00 {
            return Err(ProxyError::auth_failed(format!(
                "proxy rejected credentials (status 0x{:02x})",
                reply[1]
            )));
        }
        tracing::debug!(target = "proxy", "username/password authentication accepted");
        Ok(())
    }

    async fn send_connect_request(
        &self,
        stream: &mut TcpStream,
        host: &str,
        port: u16,
    ) -> Result<(), ProxyError> {
        let mut request = vec![SOCKS5_VERSION, CMD_CONNECT, 0x00];

        if self.resolve_locally {
            let ip = self.resolve_target_v4(host, port).await?;
            request.push(ATYP_IPV4);
            request.extend_from_slice(&ip.octets());
            tracing::debug!(target = "proxy", ip = %ip, "using locally resolved IPv4 target");
        } else if let Ok(ip) = host.parse::<IpAddr>() {
            match ip {
                IpAddr::V4(v4) => {
                    request.push(ATYP_IPV4);
                    request.extend_from_slice(&v4.octets());
                }
                IpAddr::V6(_) => {
                    return Err(ProxyError::config(
                        "IPv6 destinations are not supported in the CONNECT request",
                    ));
                }
            }
        } else {
            let bytes = host.as_bytes();
            if bytes.len() > 255 {
                return Err(ProxyError::config("hostname too long (max 255 bytes)"));
            }
            request.push(ATYP_DOMAIN);
            request.push(bytes.len() as u8);
            request.extend_from_slice(bytes);
        }
        request.extend_from_slice(&port.to_be_bytes());

        stream
            .write_all(&request)
            .await
            .map_err(|e| ProxyError::unreachable(format!("failed to send connect request: {e}")))
    }

    async fn resolve_target_v4(&self, host: &str, port: u16) -> Result<Ipv4Addr, ProxyError> {
        let addrs = lookup_host((host, port)).await.map_err(|e| {
            ProxyError::host_not_found(format!("target '{host}' did not resolve: {e}"))
        })?;
        addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| {
                ProxyError::host_not_found(format!("no IPv4 address for target '{host}'"))
            })
    }

    /// Read `05 REP RSV ATYP BND.ADDR BND.PORT`. The bound address is
    /// consumed to keep the stream positioned at the tunnel payload but is
    /// not exposed.
    async fn read_connect_reply(&self, stream: &mut TcpStream) -> Result<(), ProxyError> {
        let mut header = [0u8; 4];
        stream
            .read_exact(&mut header)
            .await
            .map_err(|e| ProxyError::unreachable(format!("failed to read connect reply: {e}")))?;

        if header[0] != SOCKS5_VERSION {
            return Err(protocol(
                Phase::Connect,
                format!("expected SOCKS version 0x05, got 0x{:02x}", header[0]),
            ));
        }
        if header[1] != REP_SUCCESS {
            return Err(ProxyError::connect_rejected(header[1]));
        }

        let addr_len = match header[3] {
            ATYP_IPV4 => 4usize,
            ATYP_IPV6 => 16,
            ATYP_DOMAIN => {
                let mut len = [0u8; 1];
                stream.read_exact(&mut len).await.map_err(|e| {
                    ProxyError::unreachable(format!("failed to read bound domain length: {e}"))
                })?;
                len[0] as usize
            }
            other => {
                return Err(protocol(
                    Phase::Connect,
                    format!("unknown address type 0x{other:02x} in reply"),
                ));
            }
        };
        let mut bound = vec![0u8; addr_len + 2];
        stream
            .read_exact(&mut bound)
            .await
            .map_err(|e| ProxyError::unreachable(format!("failed to read bound address: {e}")))?;
        Ok(())
    }
}

fn protocol(phase: Phase, msg: String) -> ProxyError {
    ProxyError::protocol(format!("{}: {msg}", phase.as_str()))
}

/// Race a negotiation step against the cancellation token. Losing the race
/// drops the step future (and with it the socket's pending I/O); the caller
/// then drops the socket itself by returning.
async fn cancellable<T, F>(
    cancel: &CancellationToken,
    step: &'static str,
    fut: F,
) -> Result<T, ProxyError>
where
    F: Future<Output = Result<T, ProxyError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProxyError::cancelled(format!(
            "request aborted during {step}"
        ))),
        result = fut => result,
    }
}
