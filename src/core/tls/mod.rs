//! TLS client configuration.

pub mod verifier;

pub use verifier::create_client_config;

use serde::{Deserialize, Serialize};

/// TLS options forwarded to the rustls layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsOptions {
    /// Verify the peer certificate chain and server name. Disabling this
    /// accepts whatever certificate the target presents.
    #[serde(default = "default_verify_peer")]
    pub verify_peer: bool,
}

fn default_verify_peer() -> bool {
    true
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self { verify_peer: true }
    }
}
