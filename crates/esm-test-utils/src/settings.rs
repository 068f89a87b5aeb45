//! Settings builders for tests.
//!
//! Use [`TestSettingsBuilder`] to create [`EsmConfig`] values rooted in a
//! temporary installation directory.

use std::path::Path;

use esm_config::EsmConfig;

/// Fluent builder for [`EsmConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let settings = TestSettingsBuilder::new(tmp.path())
///     .port(5123)
///     .idle_timeout_secs(1)
///     .build();
/// ```
pub struct TestSettingsBuilder {
    settings: EsmConfig,
}

impl TestSettingsBuilder {
    /// Defaults with the installation root (and thus credentials, lock files
    /// and logs) under `install_root`.
    pub fn new(install_root: &Path) -> Self {
        let mut settings = EsmConfig::default();
        settings.daemon.install_root = install_root.to_path_buf();
        settings.daemon.host = "127.0.0.1".to_string();
        Self { settings }
    }

    pub fn host(mut self, host: &str) -> Self {
        self.settings.daemon.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.settings.daemon.port = port;
        self
    }

    /// Listen on a port the OS reports as currently free.
    pub fn free_port(self) -> Self {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|listener| listener.local_addr())
            .map(|addr| addr.port())
            .expect("failed to find a free port");
        self.port(port)
    }

    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.settings.daemon.idle_timeout_secs = secs;
        self
    }

    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.settings.probe.timeout_secs = secs;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.settings.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> EsmConfig {
        self.settings
    }
}
