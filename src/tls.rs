//! TLS configuration with pinned CA root certificates.
//!
//! When a CA file is configured, both the WebSocket dialer and the REST
//! client trust only the certificates in that PEM file. Without one, the
//! WebSocket dialer uses the bundled webpki roots and the REST client its
//! own defaults.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_tungstenite::MaybeTlsStream;

use crate::{CambistError, Result};

/// Builds a [`ClientConfig`] whose root store contains only the
/// certificates found in the PEM file at `ca_file`.
///
/// # Errors
///
/// Returns [`CambistError::Tls`] if the file cannot be read, contains no
/// parsable certificate, or the rustls builder rejects the protocol set.
pub fn build_tls_config(ca_file: &Path) -> Result<ClientConfig> {
    let pem = std::fs::read(ca_file).map_err(|e| {
        CambistError::Tls(format!("failed to read CA file {}: {e}", ca_file.display()))
    })?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| CambistError::Tls(format!("failed to parse CA PEM: {e}")))?;

    let mut root_store = RootCertStore::empty();
    let (added, _ignored) = root_store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(CambistError::Tls(format!(
            "no usable certificates in {}",
            ca_file.display()
        )));
    }

    client_config(root_store)
}

/// Client config trusting the bundled webpki roots.
fn default_tls_config() -> Result<ClientConfig> {
    client_config(RootCertStore::from_iter(
        webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
    ))
}

fn client_config(root_store: RootCertStore) -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| CambistError::Tls(format!("failed to build TLS config: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(config)
}

/// TLS config for the WebSocket dialer: the pinned CA file when one is
/// configured, the bundled webpki roots otherwise.
pub(crate) fn ws_client_config(ca_file: Option<&Path>) -> Result<Arc<ClientConfig>> {
    let config = match ca_file {
        Some(path) => build_tls_config(path)?,
        None => default_tls_config()?,
    };
    Ok(Arc::new(config))
}

/// Runs the TLS handshake for a `wss` endpoint over an open TCP stream.
///
/// # Errors
///
/// Returns [`CambistError::Tls`] if `host` is not a valid server name, or
/// [`CambistError::Handshake`] wrapping the IO error if the TLS handshake
/// itself fails.
pub(crate) async fn connect_tls(
    stream: TcpStream,
    host: &str,
    config: Arc<ClientConfig>,
) -> Result<MaybeTlsStream<TcpStream>> {
    let domain = host.trim_start_matches('[').trim_end_matches(']');
    let server_name = ServerName::try_from(domain.to_string())
        .map_err(|e| CambistError::Tls(format!("invalid server name {domain:?}: {e}")))?;

    let tls = TlsConnector::from(config)
        .connect(server_name, stream)
        .await
        .map_err(|e| CambistError::Handshake {
            body: String::new(),
            source: tungstenite::Error::Io(e),
        })?;

    Ok(MaybeTlsStream::Rustls(tls))
}
