use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::rustls::{ClientConfig, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector, client, server};

use crate::endpoint::Transport;
use crate::error::{Error, Result};

impl<S: Transport> Transport for client::TlsStream<S> {
    fn local_addr(&self) -> Option<SocketAddr> {
        self.get_ref().0.local_addr()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.get_ref().0.peer_addr()
    }

    fn is_secure(&self) -> bool {
        true
    }
}

impl<S: Transport> Transport for server::TlsStream<S> {
    fn local_addr(&self) -> Option<SocketAddr> {
        self.get_ref().0.local_addr()
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.get_ref().0.peer_addr()
    }

    fn is_secure(&self) -> bool {
        true
    }
}

/// Client configuration trusting the webpki root store.
#[must_use]
pub fn client_config_with_native_roots() -> Arc<ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Client configuration trusting only `roots`.
///
/// # Errors
///
/// Returns `Error::Tls` if a certificate cannot be added to the store.
pub fn client_config_with_roots(roots: Vec<CertificateDer<'static>>) -> Result<Arc<ClientConfig>> {
    let mut root_store = rustls::RootCertStore::empty();
    for cert in roots {
        root_store
            .add(cert)
            .map_err(|e| Error::Tls(format!("invalid root certificate: {e}")))?;
    }
    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Server configuration with a single certificate chain.
///
/// # Errors
///
/// Returns `Error::Tls` if the key does not match the certificate.
pub fn server_config(
    cert_chain: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
) -> Result<Arc<ServerConfig>> {
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .map_err(|e| Error::Tls(format!("configuration error: {e}")))?;

    Ok(Arc::new(config))
}

/// Read every certificate from PEM data.
///
/// # Errors
///
/// Returns `Error::Tls` if the data contains no certificate.
pub fn load_certs(reader: &mut dyn BufRead) -> Result<Vec<CertificateDer<'static>>> {
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(reader).collect::<std::result::Result<Vec<_>, _>>()?;

    if certs.is_empty() {
        return Err(Error::Tls("no certificates found".into()));
    }

    Ok(certs)
}

/// Read the first private key from PEM data.
///
/// # Errors
///
/// Returns `Error::Tls` if the data contains no private key.
pub fn load_private_key(reader: &mut dyn BufRead) -> Result<PrivateKeyDer<'static>> {
    for item in rustls_pemfile::read_all(reader) {
        match item? {
            rustls_pemfile::Item::Pkcs1Key(key) => return Ok(PrivateKeyDer::Pkcs1(key)),
            rustls_pemfile::Item::Pkcs8Key(key) => return Ok(PrivateKeyDer::Pkcs8(key)),
            rustls_pemfile::Item::Sec1Key(key) => return Ok(PrivateKeyDer::Sec1(key)),
            _ => continue,
        }
    }

    Err(Error::Tls("no private key found".into()))
}

/// [`load_certs`] from a PEM file.
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be opened.
pub fn load_certs_from_file(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(File::open(path)?);
    load_certs(&mut reader)
}

/// [`load_private_key`] from a PEM file.
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be opened.
pub fn load_private_key_from_file(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(File::open(path)?);
    load_private_key(&mut reader)
}

pub(crate) async fn connect(
    config: Arc<ClientConfig>,
    domain: &str,
    stream: TcpStream,
) -> Result<client::TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(domain.to_owned())
        .map_err(|_| Error::Tls(format!("invalid DNS name: {domain}")))?;

    TlsConnector::from(config)
        .connect(server_name, stream)
        .await
        .map_err(|e| Error::Tls(format!("handshake failed: {e}")))
}

pub(crate) async fn accept(
    config: Arc<ServerConfig>,
    stream: TcpStream,
) -> Result<server::TlsStream<TcpStream>> {
    TlsAcceptor::from(config)
        .accept(stream)
        .await
        .map_err(|e| Error::Tls(format!("handshake failed: {e}")))
}
