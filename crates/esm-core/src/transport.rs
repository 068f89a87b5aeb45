//! TLS credentials and the HTTPS accept loop.
//!
//! The daemon only speaks HTTPS. Credentials are a PEM certificate chain
//! and private key from the installation root; the same certificate is the
//! trust root clients use to reach the daemon.

use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::daemon::ShutdownSignal;

/// Errors loading credentials or building the TLS configuration.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse PEM data in '{}': {source}", path.display())]
    Pem {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no certificate found in '{}'", path.display())]
    NoCertificate { path: PathBuf },

    #[error("no private key found in '{}'", path.display())]
    NoPrivateKey { path: PathBuf },

    #[error("invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

/// Certificate chain and private key for the daemon's TLS endpoint.
pub struct Credentials {
    certificate_pem: Vec<u8>,
    private_key_pem: Zeroizing<Vec<u8>>,
    certificate_path: PathBuf,
    private_key_path: PathBuf,
}

impl Credentials {
    /// Read and validate both PEM files.
    pub async fn load(certificate: &Path, private_key: &Path) -> Result<Self, TlsError> {
        let certificate_pem = read(certificate).await?;
        let private_key_pem = Zeroizing::new(read(private_key).await?);
        let credentials = Self {
            certificate_pem,
            private_key_pem,
            certificate_path: certificate.to_path_buf(),
            private_key_path: private_key.to_path_buf(),
        };
        credentials.certificates()?;
        credentials.private_key()?;
        Ok(credentials)
    }

    /// The certificate chain, PEM encoded.
    pub fn certificate_pem(&self) -> &[u8] {
        &self.certificate_pem
    }

    fn certificates(&self) -> Result<Vec<CertificateDer<'static>>, TlsError> {
        let certs = rustls_pemfile::certs(&mut BufReader::new(self.certificate_pem.as_slice()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| TlsError::Pem {
                path: self.certificate_path.clone(),
                source,
            })?;
        if certs.is_empty() {
            return Err(TlsError::NoCertificate {
                path: self.certificate_path.clone(),
            });
        }
        Ok(certs)
    }

    fn private_key(&self) -> Result<PrivateKeyDer<'static>, TlsError> {
        rustls_pemfile::private_key(&mut BufReader::new(self.private_key_pem.as_slice()))
            .map_err(|source| TlsError::Pem {
                path: self.private_key_path.clone(),
                source,
            })?
            .ok_or_else(|| TlsError::NoPrivateKey {
                path: self.private_key_path.clone(),
            })
    }

    /// Build a TLS acceptor offering HTTP/2 and HTTP/1.1.
    pub fn acceptor(&self) -> Result<TlsAcceptor, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(self.certificates()?, self.private_key()?)?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("certificate_path", &self.certificate_path)
            .field("private_key_path", &self.private_key_path)
            .field("private_key_pem", &"[REDACTED]")
            .finish()
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    tokio::fs::read(path).await.map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Accept TLS connections and serve `app` on each until shutdown.
///
/// Returning drops the listener, which closes the socket. Connections
/// already accepted keep running on their own tasks.
pub async fn serve_tls(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    app: Router,
    mut shutdown_rx: broadcast::Receiver<ShutdownSignal>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "accepting TLS connections");
    }

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            },
        };
        tokio::spawn(serve_connection(stream, peer, acceptor.clone(), app.clone()));
    }

    info!("listener closed");
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    app: Router,
) {
    let tls = match acceptor.accept(stream).await {
        Ok(tls) => tls,
        Err(e) => {
            debug!(%peer, error = %e, "TLS handshake failed");
            return;
        }
    };
    let service = TowerToHyperService::new(app);
    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(tls), service)
        .await
    {
        debug!(%peer, error = %e, "connection ended with error");
    }
}
