use std::sync::Arc;

use once_cell::sync::OnceCell;
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, Error as TlsError, OwnedTrustAnchor, RootCertStore, ServerName};

use super::TlsOptions;

/// Verifier installed when `verify_peer` is disabled: accepts any
/// certificate without inspecting it.
struct AcceptAllVerifier;

impl ServerCertVerifier for AcceptAllVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }
}

fn root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    }));
    roots
}

fn build_client_config(verify_peer: bool) -> Arc<ClientConfig> {
    let mut cfg = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store())
        .with_no_client_auth();
    if !verify_peer {
        cfg.dangerous()
            .set_certificate_verifier(Arc::new(AcceptAllVerifier));
    }
    Arc::new(cfg)
}

static VERIFYING: OnceCell<Arc<ClientConfig>> = OnceCell::new();
static INSECURE: OnceCell<Arc<ClientConfig>> = OnceCell::new();

/// rustls client config for the given options. Both variants are built once
/// per process; the root store parse is the expensive part.
pub fn create_client_config(opts: &TlsOptions) -> Arc<ClientConfig> {
    if opts.verify_peer {
        VERIFYING.get_or_init(|| build_client_config(true)).clone()
    } else {
        INSECURE.get_or_init(|| build_client_config(false)).clone()
    }
}
