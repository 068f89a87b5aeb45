//! One daemon per port: instance lock, bind, and readiness probing.
//!
//! A starting daemon first takes an advisory lock on a per-port lock file.
//! If another process holds it, the starter never binds; it polls the
//! holder's status endpoint until that daemon reports it is loaded and then
//! hands off. A daemon that wins the lock but finds the port taken (a peer
//! that predates the lock) probes the same way.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use esm_config::ProbeConfig;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::BoxFuture;
use crate::client::{ClientError, DaemonClient};
use crate::daemon::DaemonError;
use crate::types::StatusResponse;

/// Exclusive advisory lock on the per-port lock file; released on drop.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Try to take the lock. `Ok(None)` means another process holds it.
    pub fn acquire(path: &Path) -> Result<Option<Self>, DaemonError> {
        let lock_error = |source| DaemonError::Lock {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(lock_error)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(lock_error)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Ok(None),
            Err(TryLockError::Error(source)) => return Err(lock_error(source)),
        }

        file.set_len(0).map_err(lock_error)?;
        writeln!(file, "{}", std::process::id()).map_err(lock_error)?;
        debug!(path = %path.display(), "acquired instance lock");
        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %e, "failed to release instance lock");
        }
    }
}

/// Source of status responses from a peer daemon.
pub trait StatusProbe: Send + Sync {
    fn status(&self) -> BoxFuture<'_, Result<StatusResponse, ClientError>>;
}

impl StatusProbe for DaemonClient {
    fn status(&self) -> BoxFuture<'_, Result<StatusResponse, ClientError>> {
        Box::pin(DaemonClient::status(self))
    }
}

/// Backoff and deadline for waiting on a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub timeout: Duration,
}

impl From<&ProbeConfig> for ProbePolicy {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
            timeout: config.timeout(),
        }
    }
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self::from(&ProbeConfig::default())
    }
}

/// Poll the peer until it reports `loaded`.
///
/// Unanswered probes and `loaded: false` keep polling with doubling
/// backoff, capped at `max_backoff`. A peer that is not an esm daemon
/// fails immediately; running out of time fails with
/// [`DaemonError::ProbeTimeout`].
pub async fn wait_until_ready(
    probe: &dyn StatusProbe,
    policy: &ProbePolicy,
) -> Result<StatusResponse, DaemonError> {
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut backoff = policy.initial_backoff;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match tokio::time::timeout_at(deadline, probe.status()).await {
            Ok(Ok(status)) if !status.is_esm() => {
                return Err(DaemonError::ForeignPeer {
                    server: status.server,
                });
            }
            Ok(Ok(status)) if status.loaded => {
                info!(attempts, waited_ms = started.elapsed().as_millis() as u64, "peer daemon is ready");
                return Ok(status);
            }
            Ok(Ok(_)) => debug!(attempts, "peer daemon is still loading"),
            Ok(Err(e)) => debug!(attempts, error = %e, "peer daemon not answering yet"),
            Err(_) => debug!(attempts, "status probe hit the deadline"),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(DaemonError::ProbeTimeout {
                attempts,
                waited: now - started,
            });
        }
        tokio::time::sleep_until((now + backoff).min(deadline)).await;
        backoff = (backoff * 2).min(policy.max_backoff);
    }
}

/// Result of trying to become the daemon for a port.
#[derive(Debug)]
pub enum Startup {
    /// This process owns the port.
    Bound {
        listener: TcpListener,
        lock: InstanceLock,
    },
    /// A loaded peer already serves the port.
    HandedOff(StatusResponse),
}

/// Take the instance lock and bind, or wait for the peer that owns the port.
pub async fn bind_or_probe(
    host: &str,
    port: u16,
    lock_path: &Path,
    probe: &dyn StatusProbe,
    policy: &ProbePolicy,
) -> Result<Startup, DaemonError> {
    let Some(lock) = InstanceLock::acquire(lock_path)? else {
        info!(port, "instance lock is held, waiting for the running daemon");
        return wait_until_ready(probe, policy).await.map(Startup::HandedOff);
    };

    match TcpListener::bind((host, port)).await {
        Ok(listener) => Ok(Startup::Bound { listener, lock }),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            drop(lock);
            info!(port, "address in use, waiting for the running daemon");
            wait_until_ready(probe, policy).await.map(Startup::HandedOff)
        }
        Err(source) => Err(DaemonError::Bind {
            addr: format!("{host}:{port}"),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    use crate::types::{PROTOCOL_VERSION, SERVER_NAME};

    /// Replays scripted answers, then repeats `fallback`.
    struct ScriptedProbe {
        script: Mutex<VecDeque<Result<StatusResponse, ClientError>>>,
        fallback: StatusResponse,
        calls: AtomicU32,
    }

    impl ScriptedProbe {
        fn new(script: Vec<Result<StatusResponse, ClientError>>, fallback: StatusResponse) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl StatusProbe for ScriptedProbe {
        fn status(&self) -> BoxFuture<'_, Result<StatusResponse, ClientError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let fallback = self.fallback.clone();
            Box::pin(async move { next.unwrap_or(Ok(fallback)) })
        }
    }

    fn status(loaded: bool) -> StatusResponse {
        StatusResponse {
            server: SERVER_NAME.to_string(),
            loaded,
            version: PROTOCOL_VERSION,
        }
    }

    fn unreachable() -> ClientError {
        ClientError::Parse {
            url: "https://localhost:4466/esm-status".to_string(),
            reason: "connection refused".to_string(),
        }
    }

    fn policy() -> ProbePolicy {
        ProbePolicy {
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(15),
        }
    }

    #[test]
    fn test_lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run/esm-server-4466.lock");

        let first = InstanceLock::acquire(&path).unwrap().expect("lock is free");
        assert!(InstanceLock::acquire(&path).unwrap().is_none());
        let pid = std::fs::read_to_string(first.path()).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());

        drop(first);
        assert!(InstanceLock::acquire(&path).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_through_loading_peer() {
        let probe = ScriptedProbe::new(
            vec![Err(unreachable()), Ok(status(false)), Ok(status(false))],
            status(true),
        );
        let started = Instant::now();
        let ready = wait_until_ready(&probe, &policy()).await.unwrap();
        assert!(ready.loaded);
        assert_eq!(probe.calls(), 4);
        // 25 + 50 + 100 ms of backoff between the four probes.
        assert_eq!(started.elapsed(), Duration::from_millis(175));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped() {
        let probe = ScriptedProbe::new(vec![], status(false));
        let policy = ProbePolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(200),
            timeout: Duration::from_secs(1),
        };
        let err = wait_until_ready(&probe, &policy).await.unwrap_err();
        match err {
            DaemonError::ProbeTimeout { attempts, waited } => {
                // Sleeps of 100, 200, 200, 200, 200, then the clamped 100.
                assert_eq!(attempts, 7);
                assert_eq!(waited, Duration::from_secs(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_that_never_loads_times_out() {
        let probe = ScriptedProbe::new(vec![], status(false));
        let err = wait_until_ready(&probe, &policy()).await.unwrap_err();
        assert!(matches!(err, DaemonError::ProbeTimeout { .. }));
        assert!(probe.calls() > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_peer_is_fatal() {
        let foreign = StatusResponse {
            server: "nginx".to_string(),
            loaded: true,
            version: 1,
        };
        let probe = ScriptedProbe::new(vec![], foreign);
        let err = wait_until_ready(&probe, &policy()).await.unwrap_err();
        assert!(matches!(err, DaemonError::ForeignPeer { ref server } if server == "nginx"));
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn test_held_lock_hands_off_without_binding() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("esm-server-4466.lock");
        let _held = InstanceLock::acquire(&lock_path).unwrap().unwrap();

        let probe = ScriptedProbe::new(vec![], status(true));
        let startup = bind_or_probe("127.0.0.1", 0, &lock_path, &probe, &policy())
            .await
            .unwrap();
        assert!(matches!(startup, Startup::HandedOff(ref s) if s.loaded));
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn test_port_in_use_hands_off() {
        let dir = TempDir::new().unwrap();
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let probe = ScriptedProbe::new(vec![], status(true));
        let startup = bind_or_probe(
            "127.0.0.1",
            port,
            &dir.path().join("esm-server.lock"),
            &probe,
            &policy(),
        )
        .await
        .unwrap();
        assert!(matches!(startup, Startup::HandedOff(_)));
    }

    #[tokio::test]
    async fn test_free_port_binds() {
        let dir = TempDir::new().unwrap();
        let lock_path = dir.path().join("esm-server.lock");
        let probe = ScriptedProbe::new(vec![], status(true));

        let startup = bind_or_probe("127.0.0.1", 0, &lock_path, &probe, &policy())
            .await
            .unwrap();
        match startup {
            Startup::Bound { listener, lock } => {
                assert!(listener.local_addr().unwrap().port() > 0);
                assert_eq!(lock.path(), lock_path);
            }
            Startup::HandedOff(_) => panic!("expected to bind"),
        }
        assert_eq!(probe.calls(), 0);
    }
}
