//! Proxy error types for classification and handling

use std::fmt;

/// Proxy-specific error types for better error classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// Invalid proxy configuration (bad URL, unsupported scheme, bad port)
    Config(String),

    /// The proxy (or locally-resolved target) hostname did not resolve
    HostNotFound(String),

    /// Connection-level failure talking to the proxy
    Unreachable(String),

    /// The proxy did not answer within the handshake deadline
    Timeout(String),

    /// The proxy sent bytes that violate the SOCKS5 protocol
    Protocol(String),

    /// The proxy demands authentication we cannot provide
    AuthRequired(String),

    /// Username/password sub-negotiation was rejected
    AuthFailed(String),

    /// The CONNECT request was rejected with a nonzero REP code
    ConnectRejected { code: u8, reason: &'static str },

    /// The cancellation token fired mid-dial
    Cancelled(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Config(msg) => write!(f, "Configuration error: {msg}"),
            ProxyError::HostNotFound(msg) => write!(f, "Proxy host not found: {msg}"),
            ProxyError::Unreachable(msg) => write!(f, "Proxy unreachable: {msg}"),
            ProxyError::Timeout(msg) => write!(f, "Timeout error: {msg}"),
            ProxyError::Protocol(msg) => write!(f, "Protocol violation: {msg}"),
            ProxyError::AuthRequired(msg) => write!(f, "Authentication required: {msg}"),
            ProxyError::AuthFailed(msg) => write!(f, "Authentication failed: {msg}"),
            ProxyError::ConnectRejected { code, reason } => {
                write!(f, "Connect rejected: {reason} (code 0x{code:02x})")
            }
            ProxyError::Cancelled(msg) => write!(f, "Cancelled: {msg}"),
        }
    }
}

impl std::error::Error for ProxyError {}

impl ProxyError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        ProxyError::Config(msg.into())
    }

    /// Create a host-not-found error
    pub fn host_not_found(msg: impl Into<String>) -> Self {
        ProxyError::HostNotFound(msg.into())
    }

    /// Create a connection-level error
    pub fn unreachable(msg: impl Into<String>) -> Self {
        ProxyError::Unreachable(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        ProxyError::Timeout(msg.into())
    }

    /// Create a protocol violation error
    pub fn protocol(msg: impl Into<String>) -> Self {
        ProxyError::Protocol(msg.into())
    }

    /// Create an authentication-required error
    pub fn auth_required(msg: impl Into<String>) -> Self {
        ProxyError::AuthRequired(msg.into())
    }

    /// Create an authentication-failed error
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        ProxyError::AuthFailed(msg.into())
    }

    /// Create a connect-rejected error from a SOCKS5 REP code
    pub fn connect_rejected(code: u8) -> Self {
        let reason = match code {
            0x01 => "general SOCKS server failure",
            0x02 => "connection not allowed by ruleset",
            0x03 => "network unreachable",
            0x04 => "host unreachable",
            0x05 => "connection refused",
            0x06 => "TTL expired",
            0x07 => "command not supported",
            0x08 => "address type not supported",
            _ => "unknown SOCKS error",
        };
        ProxyError::ConnectRejected { code, reason }
    }

    /// Create a cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        ProxyError::Cancelled(msg.into())
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ProxyError::Config(_) => "config",
            ProxyError::HostNotFound(_) => "host-not-found",
            ProxyError::Unreachable(_) => "unreachable",
            ProxyError::Timeout(_) => "timeout",
            ProxyError::Protocol(_) => "protocol",
            ProxyError::AuthRequired(_) => "auth-required",
            ProxyError::AuthFailed(_) => "auth-failed",
            ProxyError::ConnectRejected { .. } => "connect-rejected",
            ProxyError::Cancelled(_) => "cancelled",
        }
    }
}
