//! TLS engine wiring: a client-side TLS stack with SNI and certificate
//! verification, floored at TLS 1.2.

use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;

use crate::error::{Error, Result};

/// Builds the process-wide TLS client config: Mozilla's root set, TLS 1.2
/// as the floor. Failure here surfaces as [`Error::Resource`].
pub(crate) fn client_config() -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

pub(crate) fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| Error::resource(format!("invalid SNI host name {host:?}: {e}")))
}
