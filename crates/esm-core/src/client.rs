//! HTTPS client for a running daemon.
//!
//! Used by the CLI for every command and by a starting daemon to probe a
//! peer that already owns the port. The installation certificate is added
//! as the trust root, so the client only talks to daemons set up from the
//! same installation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use esm_config::{ConfigNode, EsmConfig};
use reqwest::{Certificate, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::controllers::module::MODULE_HEADER;
use crate::controllers::module_yml::KEY_HEADER;
use crate::error::ErrorEnvelope;
use crate::types::*;

/// Errors from the daemon client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot reach the daemon at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("daemon returned an error: {0}")]
    Daemon(ErrorEnvelope),

    #[error("failed to read the daemon certificate '{}': {source}", path.display())]
    CertificateFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to set up the TLS client: {0}")]
    Tls(#[source] reqwest::Error),

    #[error("path '{}' cannot be sent in a header", .0.display())]
    InvalidPath(PathBuf),
}

impl ClientError {
    /// Whether the daemon did not answer at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ClientError::Connect { .. })
    }
}

/// Typed client for the daemon's HTTP API.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
}

impl DaemonClient {
    /// A client for `base_url`, trusting `root_certificate` (PEM) if given.
    pub fn new(
        base_url: impl Into<String>,
        root_certificate: Option<&[u8]>,
        request_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(request_timeout);
        if let Some(pem) = root_certificate {
            builder = builder.add_root_certificate(Certificate::from_pem(pem).map_err(ClientError::Tls)?);
        }
        let http = builder.build().map_err(ClientError::Tls)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// A client for the configured daemon using an already loaded certificate.
    pub fn from_settings(settings: &EsmConfig, certificate_pem: &[u8]) -> Result<Self, ClientError> {
        Self::new(
            settings.daemon.base_url(),
            Some(certificate_pem),
            settings.probe.request_timeout(),
        )
    }

    /// A client for the configured daemon, reading the installation certificate.
    pub async fn connect(settings: &EsmConfig) -> Result<Self, ClientError> {
        let path = settings.certificate_path();
        let pem = tokio::fs::read(&path)
            .await
            .map_err(|source| ClientError::CertificateFile { path, source })?;
        Self::from_settings(settings, &pem)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, url: String, request: RequestBuilder) -> Result<T, ClientError> {
        debug!(%url, "daemon request");
        let response = request.send().await.map_err(|source| {
            if source.is_connect() || source.is_timeout() {
                ClientError::Connect {
                    url: url.clone(),
                    source,
                }
            } else {
                ClientError::Request {
                    url: url.clone(),
                    source,
                }
            }
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| ClientError::Request {
                url: url.clone(),
                source,
            })?;

        if !status.is_success() {
            return match serde_json::from_slice::<ErrorEnvelope>(&body) {
                Ok(envelope) => Err(ClientError::Daemon(envelope)),
                Err(_) => Err(ClientError::Parse {
                    url,
                    reason: format!("unexpected status {status}"),
                }),
            };
        }

        serde_json::from_slice(&body).map_err(|e| ClientError::Parse {
            url,
            reason: e.to_string(),
        })
    }

    /// `GET /esm-status`.
    pub async fn status(&self) -> Result<StatusResponse, ClientError> {
        let url = self.url(STATUS_PATH);
        self.send(url.clone(), self.http.get(url)).await
    }

    /// `GET /application-status`.
    pub async fn application_status(&self) -> Result<ApplicationStatus, ClientError> {
        let url = self.url("/application-status");
        self.send(url.clone(), self.http.get(url)).await
    }

    /// The whole `module.yml` of `module`, or `{value}` for a single key.
    pub async fn module_data(
        &self,
        module: &Path,
        key: Option<&str>,
    ) -> Result<serde_json::Value, ClientError> {
        let url = self.url("/module-yml");
        let mut request = self.http.get(&url).header(MODULE_HEADER, header_path(module)?);
        if let Some(key) = key {
            request = request.header(KEY_HEADER, key);
        }
        self.send(url, request).await
    }

    /// Set `key` in `module`'s `module.yml` and save it.
    pub async fn set_module_value(
        &self,
        module: &Path,
        key: &str,
        value: ConfigNode,
    ) -> Result<ModuleValueUpdated, ClientError> {
        let url = self.url("/module-yml");
        let body = ModuleValueUpdate {
            key: Some(key.to_string()),
            value,
        };
        let request = self
            .http
            .put(&url)
            .header(MODULE_HEADER, header_path(module)?)
            .json(&body);
        self.send(url, request).await
    }

    /// Link the module at `from` into the project at `to`.
    pub async fn link(&self, from: &Path, to: &Path) -> Result<LinkResponse, ClientError> {
        let url = self.url("/link");
        let body = LinkRequest {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        };
        self.send(url.clone(), self.http.post(url).json(&body)).await
    }
}

fn header_path(path: &Path) -> Result<&str, ClientError> {
    path.to_str()
        .filter(|s| s.bytes().all(|b| (0x20..0x7f).contains(&b)))
        .ok_or_else(|| ClientError::InvalidPath(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client =
            DaemonClient::new("https://localhost:4466/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "https://localhost:4466");
        assert_eq!(client.url(STATUS_PATH), "https://localhost:4466/esm-status");
    }

    #[tokio::test]
    async fn test_unreachable_daemon() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = DaemonClient::new(
            format!("https://127.0.0.1:{port}"),
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client.status().await.unwrap_err();
        assert!(err.is_unreachable(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_missing_certificate_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut settings = EsmConfig::default();
        settings.daemon.install_root = dir.path().to_path_buf();
        let err = DaemonClient::connect(&settings).await.unwrap_err();
        assert!(matches!(err, ClientError::CertificateFile { .. }));
    }

    #[test]
    fn test_header_path() {
        assert_eq!(header_path(Path::new("/srv/mod")).unwrap(), "/srv/mod");
        assert!(header_path(Path::new("/srv/m\u{f6}d")).is_err());
    }
}
