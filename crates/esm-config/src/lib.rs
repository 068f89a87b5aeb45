#![deny(unsafe_code)]

//! Configuration for esm.
//!
//! Two kinds of configuration live here:
//!
//! - [`EsmConfig`], the daemon's own settings, loaded from a TOML file in the
//!   installation root and validated on load.
//! - [`module_file::ModuleFile`], the per-module `module.yml` accessor built
//!   on the [`tree`] module's dotted-path get/set.

/// `module.yml` loading, saving, and typed accessors.
pub mod module_file;
/// Config tree nodes and dotted path expressions.
pub mod tree;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use module_file::{MODULE_FILE_NAME, ModuleFile, ModuleFileError};
pub use tree::{ConfigNode, ConfigPath, Mapping, Scalar, TreeError};

/// Name of the settings file inside the installation root.
pub const SETTINGS_FILE_NAME: &str = "esm.toml";

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level daemon configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EsmConfig {
    /// Daemon listen address, idle timeout, and installation paths.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// TLS credential locations.
    #[serde(default)]
    pub tls: TlsConfig,

    /// Readiness probe policy used when another instance is starting.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the daemon process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Host the daemon listens on and clients connect to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the daemon listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds without any request before the daemon shuts itself down.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Installation root. Relative credential paths resolve against it.
    #[serde(default = "default_install_root")]
    pub install_root: PathBuf,

    /// Directory holding the per-port instance lock files.
    /// Defaults to `<install_root>/run`.
    #[serde(default)]
    pub runtime_dir: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            idle_timeout_secs: default_idle_timeout_secs(),
            install_root: default_install_root(),
            runtime_dir: None,
        }
    }
}

impl DaemonConfig {
    /// The idle timeout as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Directory for runtime files (lock files).
    pub fn runtime_dir(&self) -> PathBuf {
        self.runtime_dir
            .clone()
            .unwrap_or_else(|| self.install_root.join("run"))
    }

    /// Lock file guarding the listening port against a second daemon.
    pub fn lock_path(&self) -> PathBuf {
        self.runtime_dir().join(format!("esm-server-{}.lock", self.port))
    }

    /// Base URL clients use to reach the daemon.
    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    4466
}

fn default_idle_timeout_secs() -> u64 {
    10
}

fn default_install_root() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".esm")
        .join("esm-server")
}

/// TLS credential locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM certificate chain, relative to the installation root unless absolute.
    #[serde(default = "default_certificate")]
    pub certificate: PathBuf,

    /// PEM private key, relative to the installation root unless absolute.
    #[serde(default = "default_private_key")]
    pub private_key: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            certificate: default_certificate(),
            private_key: default_private_key(),
        }
    }
}

fn default_certificate() -> PathBuf {
    PathBuf::from("certificate/localhost-certificate.pem")
}

fn default_private_key() -> PathBuf {
    PathBuf::from("certificate/localhost-privatekey.pem")
}

/// Backoff policy for polling a peer daemon until it reports `loaded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Delay after the first unsuccessful probe, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the doubling delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Give up after this many seconds.
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for a single status request, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_probe_timeout_secs(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ProbeConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_initial_backoff_ms() -> u64 {
    25
}

fn default_max_backoff_ms() -> u64 {
    500
}

fn default_probe_timeout_secs() -> u64 {
    15
}

fn default_request_timeout_ms() -> u64 {
    2000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Append log output to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EsmConfig {
    /// Default location of the settings file.
    pub fn default_path() -> PathBuf {
        default_install_root().join(SETTINGS_FILE_NAME)
    }

    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub async fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: EsmConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.port == 0 {
            return Err(ConfigError::Validation(
                "daemon.port must be non-zero".to_string(),
            ));
        }
        if self.daemon.host.is_empty() {
            return Err(ConfigError::Validation(
                "daemon.host must not be empty".to_string(),
            ));
        }
        if self.daemon.idle_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "daemon.idle_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.probe.initial_backoff_ms == 0 {
            return Err(ConfigError::Validation(
                "probe.initial_backoff_ms must be non-zero".to_string(),
            ));
        }
        if self.probe.max_backoff_ms < self.probe.initial_backoff_ms {
            return Err(ConfigError::Validation(format!(
                "probe.max_backoff_ms ({}) must not be below probe.initial_backoff_ms ({})",
                self.probe.max_backoff_ms, self.probe.initial_backoff_ms
            )));
        }
        if self.probe.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "probe.timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.probe.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "probe.request_timeout_ms must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve a path from the config against the installation root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.daemon.install_root.join(path)
        }
    }

    /// Absolute path of the TLS certificate chain.
    pub fn certificate_path(&self) -> PathBuf {
        self.resolve(&self.tls.certificate)
    }

    /// Absolute path of the TLS private key.
    pub fn private_key_path(&self) -> PathBuf {
        self.resolve(&self.tls.private_key)
    }

    /// Default log file for a detached daemon.
    pub fn default_log_file(&self) -> PathBuf {
        self.daemon.install_root.join("logs").join("esm-server.log")
    }
}
