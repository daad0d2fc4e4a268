//! rustls client support for `wss://` sessions.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use rustls::pki_types::{CertificateDer, ServerName};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("TLS I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS configuration error: {0}")]
    Configuration(String),

    #[error("no certificates found in file")]
    NoCertificatesFound,

    #[error("invalid DNS name: {0}")]
    InvalidDnsName(String),
}

pub struct TlsConnector {
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            inner: tokio_rustls::TlsConnector::from(config),
        }
    }

    /// Run the TLS handshake over `stream`, verifying the certificate for `domain`.
    pub async fn connect<S>(&self, domain: &str, stream: S) -> Result<TlsStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|_| TlsError::InvalidDnsName(domain.to_string()))?;

        Ok(self.inner.connect(server_name, stream).await?)
    }
}

fn client_config_from_store(root_store: RootCertStore) -> Arc<ClientConfig> {
    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )
}

/// Client configuration trusting the bundled webpki root set.
///
/// Built once per process and shared.
pub fn client_config_with_webpki_roots() -> Result<Arc<ClientConfig>, TlsError> {
    static DEFAULT: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    Ok(DEFAULT
        .get_or_init(|| {
            client_config_from_store(RootCertStore::from_iter(
                webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
            ))
        })
        .clone())
}

/// Client configuration trusting only the given certificates.
pub fn client_config_with_roots(
    certs: impl IntoIterator<Item = CertificateDer<'static>>,
) -> Result<Arc<ClientConfig>, TlsError> {
    let mut root_store = RootCertStore::empty();
    for cert in certs {
        root_store
            .add(cert)
            .map_err(|e| TlsError::Configuration(e.to_string()))?;
    }
    Ok(client_config_from_store(root_store))
}

/// Client configuration trusting only the certificates in a PEM file.
pub fn client_config_with_root_file(path: &Path) -> Result<Arc<ClientConfig>, TlsError> {
    client_config_with_roots(load_certs_from_file(path)?)
}

pub fn load_certs_from_file(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificatesFound);
    }

    Ok(certs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn self_signed_pem() -> String {
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .unwrap()
            .cert
            .pem()
    }

    #[test]
    fn test_tls_error_display() {
        let config_err = TlsError::Configuration("bad config".to_string());
        assert_eq!(config_err.to_string(), "TLS configuration error: bad config");

        let invalid_dns = TlsError::InvalidDnsName("bad name".to_string());
        assert_eq!(invalid_dns.to_string(), "invalid DNS name: bad name");
    }

    #[test]
    fn test_tls_error_source() {
        let io_err = TlsError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "test"));
        assert!(io_err.source().is_some());
        assert!(TlsError::NoCertificatesFound.source().is_none());
    }

    #[test]
    fn test_load_certs_file_not_found() {
        let result = load_certs_from_file(Path::new("/nonexistent/path/cert.pem"));
        assert!(matches!(result, Err(TlsError::Io(_))));
    }

    #[test]
    fn test_load_certs_no_certs_in_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"not a certificate\njust some text\n").unwrap();
        temp.flush().unwrap();

        let result = load_certs_from_file(temp.path());
        assert!(matches!(result, Err(TlsError::NoCertificatesFound)));
    }

    #[test]
    fn test_root_file_config() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(self_signed_pem().as_bytes()).unwrap();
        temp.flush().unwrap();

        assert_eq!(load_certs_from_file(temp.path()).unwrap().len(), 1);
        assert!(client_config_with_root_file(temp.path()).is_ok());
    }

    #[test]
    fn test_native_roots_config_is_shared() {
        let a = client_config_with_webpki_roots().unwrap();
        let b = client_config_with_webpki_roots().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
