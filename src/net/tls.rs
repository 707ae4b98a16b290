//! TLS client configuration and trust anchor loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::RootCertStore;

use crate::config::TlsConfig;
use crate::error::{Error, Result};

/// Build a rustls client configuration.
///
/// Web PKI roots are always trusted; `ca_file` adds PEM anchors on top.
/// `alpn` is written verbatim into the config.
pub fn client_config(tls: &TlsConfig, alpn: &[&[u8]]) -> Result<rustls::ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = tls.ca_file.as_deref() {
        let added = load_ca_file(Path::new(path), &mut roots)?;
        tracing::debug!(path = %path, certificates = added, "Loaded extra trust anchors");
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();

    Ok(config)
}

fn load_ca_file(path: &Path, roots: &mut RootCertStore) -> Result<usize> {
    if !path.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("CA file not found: {:?}", path),
        )));
    }

    let mut reader = BufReader::new(File::open(path)?);
    let mut added = 0;
    for cert in rustls_pemfile::certs(&mut reader) {
        roots
            .add(cert?)
            .map_err(|e| Error::Tls(format!("invalid CA certificate in {:?}: {}", path, e)))?;
        added += 1;
    }

    if added == 0 {
        return Err(Error::Tls(format!("no certificates found in {:?}", path)));
    }
    Ok(added)
}
