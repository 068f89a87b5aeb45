//! Daemon lifecycle: startup, status route, idle shutdown.
//!
//! ```text
//! Starting -> Binding -> Bound (loading) -> Ready -> Stopped
//!                     \-> Contended -> Probing -> HandedOff
//! ```
//!
//! The status route is built before binding, so `GET /esm-status` answers
//! as soon as the socket is live. Every other request is refused with
//! `503 server-loading` until the compiled service router is installed.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tower::ServiceExt;
use tracing::{error, info, warn};

use esm_config::EsmConfig;

use crate::client::{ClientError, DaemonClient};
use crate::controllers::builtin_factories;
use crate::error::ApiError;
use crate::service::{ControllerFactory, Service, ServiceError};
use crate::singleton::{ProbePolicy, Startup, bind_or_probe};
use crate::transport::{Credentials, TlsError, serve_tls};
use crate::types::{PROTOCOL_VERSION, SERVER_NAME, STATUS_PATH, StatusResponse};

/// Code sent for requests that arrive before the service is loaded.
pub const SERVER_LOADING: &str = "server-loading";

/// Shutdown signal sent via broadcast channel.
#[derive(Debug, Clone)]
pub struct ShutdownSignal;

/// Errors from the daemon runtime.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("failed to load TLS credentials: {0}")]
    Tls(#[from] TlsError),

    #[error("failed to set up the daemon client: {0}")]
    Client(#[from] ClientError),

    #[error("failed to take the instance lock '{}': {source}", path.display())]
    Lock {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error(
        "timed out waiting for the running daemon to load ({attempts} attempts over {}ms)",
        waited.as_millis()
    )]
    ProbeTimeout { attempts: u32, waited: Duration },

    #[error("the port is served by `{server}`, not by an esm daemon")]
    ForeignPeer { server: String },

    #[error("failed to load the service: {0}")]
    Service(#[from] ServiceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared by the status route, the activity middleware and the
/// idle watcher.
pub struct DaemonState {
    started_at: Instant,
    last_activity: Mutex<Instant>,
    idle_timeout: Duration,
    loaded: AtomicBool,
    service: OnceLock<Router>,
}

impl DaemonState {
    pub fn new(idle_timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            started_at: now,
            last_activity: Mutex::new(now),
            idle_timeout,
            loaded: AtomicBool::new(false),
            service: OnceLock::new(),
        }
    }

    pub fn record_activity(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time since the last request.
    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Install the compiled service router and flip to ready.
    ///
    /// Returns `false` if a router was already installed.
    pub fn mark_loaded(&self, router: Router) -> bool {
        if self.service.set(router).is_err() {
            return false;
        }
        self.loaded.store(true, Ordering::Release);
        true
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            server: SERVER_NAME.to_string(),
            loaded: self.is_loaded(),
            version: PROTOCOL_VERSION,
        }
    }
}

/// The router bound to the socket: the status route, plus a fallback that
/// forwards to the service router once it is installed.
pub fn status_router(state: Arc<DaemonState>) -> Router {
    Router::new()
        .route(STATUS_PATH, get(handle_status))
        .fallback(handle_service)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            track_activity,
        ))
        .with_state(state)
}

async fn handle_status(State(state): State<Arc<DaemonState>>) -> Json<StatusResponse> {
    Json(state.status())
}

async fn handle_service(State(state): State<Arc<DaemonState>>, req: Request) -> Response {
    match state.service.get() {
        Some(router) => match router.clone().oneshot(req).await {
            Ok(response) => response,
            Err(never) => match never {},
        },
        None => ApiError::with_status(
            StatusCode::SERVICE_UNAVAILABLE,
            SERVER_LOADING,
            "the server is still loading",
        )
        .into_response(),
    }
}

async fn track_activity(State(state): State<Arc<DaemonState>>, req: Request, next: Next) -> Response {
    state.record_activity();
    next.run(req).await
}

/// Trigger shutdown once no request has arrived for the idle timeout.
///
/// Checks four times per timeout period and returns on shutdown.
pub async fn idle_watch(state: Arc<DaemonState>, shutdown_tx: broadcast::Sender<ShutdownSignal>) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    let period = (state.idle_timeout() / 4).max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => return,
            _ = ticker.tick() => {
                let idle = state.idle_for();
                if idle >= state.idle_timeout() {
                    info!(idle_ms = idle.as_millis() as u64, "idle timeout reached, shutting down");
                    let _ = shutdown_tx.send(ShutdownSignal);
                    return;
                }
            }
        }
    }
}

/// How [`Daemon::run`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// This process served until shutdown.
    Stopped,
    /// Another daemon already serves the port and is loaded.
    HandedOff(StatusResponse),
}

/// The esm daemon.
pub struct Daemon {
    settings: EsmConfig,
    factories: Vec<ControllerFactory>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
}

impl Daemon {
    /// A daemon serving the built-in controllers.
    pub fn new(settings: EsmConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self {
            settings,
            factories: builtin_factories(),
            shutdown_tx,
        }
    }

    /// Replace the controller set.
    pub fn with_controllers(mut self, factories: Vec<ControllerFactory>) -> Self {
        self.factories = factories;
        self
    }

    pub fn settings(&self) -> &EsmConfig {
        &self.settings
    }

    /// Sender that stops a running daemon.
    pub fn shutdown_handle(&self) -> broadcast::Sender<ShutdownSignal> {
        self.shutdown_tx.clone()
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(ShutdownSignal);
    }

    /// Start, serve until shutdown, or hand off to a running peer.
    pub async fn run(&self) -> Result<RunOutcome, DaemonError> {
        let started = Instant::now();
        let daemon = &self.settings.daemon;
        info!(host = %daemon.host, port = daemon.port, "esm daemon starting");

        let credentials = Credentials::load(
            &self.settings.certificate_path(),
            &self.settings.private_key_path(),
        )
        .await?;
        let acceptor = credentials.acceptor()?;
        let client = DaemonClient::from_settings(&self.settings, credentials.certificate_pem())?;

        let state = Arc::new(DaemonState::new(daemon.idle_timeout()));
        let app = status_router(Arc::clone(&state));
        let policy = ProbePolicy::from(&self.settings.probe);

        let (listener, _lock) = match bind_or_probe(
            &daemon.host,
            daemon.port,
            &daemon.lock_path(),
            &client,
            &policy,
        )
        .await?
        {
            Startup::Bound { listener, lock } => (listener, lock),
            Startup::HandedOff(status) => {
                info!(version = status.version, "a daemon is already running, exiting");
                return Ok(RunOutcome::HandedOff(status));
            }
        };
        let addr: Option<SocketAddr> = listener.local_addr().ok();
        info!(?addr, "bound, loading controllers");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let server = tokio::spawn(serve_tls(
            listener,
            acceptor,
            app,
            self.shutdown_tx.subscribe(),
        ));
        let idle = tokio::spawn(idle_watch(Arc::clone(&state), self.shutdown_tx.clone()));

        match Service::load(&self.factories).await {
            Ok(service) => {
                state.mark_loaded(service.router());
                info!(
                    load_ms = started.elapsed().as_millis() as u64,
                    controllers = service.registry().len(),
                    "daemon ready"
                );
            }
            Err(e) => {
                error!(error = %e, "failed to load controllers");
                self.shutdown();
                let _ = server.await;
                let _ = idle.await;
                return Err(e.into());
            }
        }

        tokio::select! {
            _ = shutdown_rx.recv() => info!("shutdown requested"),
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                self.shutdown();
            }
            _ = terminate() => {
                info!("SIGTERM received, shutting down");
                self.shutdown();
            }
        }

        let _ = server.await;
        let _ = idle.await;
        info!(uptime_secs = state.uptime().as_secs(), "daemon stopped");
        Ok(RunOutcome::Stopped)
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use pretty_assertions::assert_eq;

    fn get_request(uri: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 1 << 16).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_status_before_and_after_load() {
        let state = Arc::new(DaemonState::new(Duration::from_secs(10)));
        let app = status_router(Arc::clone(&state));

        let resp = app.clone().oneshot(get_request("/esm-status")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            json(resp).await,
            serde_json::json!({"server": "esm", "loaded": false, "version": 1})
        );

        let resp = app.clone().oneshot(get_request("/application-status")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json(resp).await;
        assert_eq!(body["code"], SERVER_LOADING);
        assert_eq!(body["status"], 503);

        let service = Service::load(&builtin_factories()).await.unwrap();
        assert!(state.mark_loaded(service.router()));
        assert!(!state.mark_loaded(Router::new()));

        let resp = app.clone().oneshot(get_request("/esm-status")).await.unwrap();
        assert_eq!(json(resp).await["loaded"], true);

        let resp = app.oneshot(get_request("/application-status")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json(resp).await["status"], "ready");
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_record_activity() {
        let state = Arc::new(DaemonState::new(Duration::from_secs(10)));
        let app = status_router(Arc::clone(&state));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(state.idle_for(), Duration::from_secs(4));

        app.oneshot(get_request("/esm-status")).await.unwrap();
        assert_eq!(state.idle_for(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_watch_triggers_shutdown() {
        let state = Arc::new(DaemonState::new(Duration::from_secs(10)));
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(4);
        let started = Instant::now();

        let watcher = tokio::spawn(idle_watch(Arc::clone(&state), shutdown_tx));
        shutdown_rx.recv().await.unwrap();
        watcher.await.unwrap();

        // Checked every 2.5s; the fourth check sees 10s of idleness.
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_postpones_idle_shutdown() {
        let state = Arc::new(DaemonState::new(Duration::from_secs(10)));
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(4);
        let started = Instant::now();
        let watcher = tokio::spawn(idle_watch(Arc::clone(&state), shutdown_tx));

        tokio::time::sleep(Duration::from_secs(6)).await;
        state.record_activity();

        shutdown_rx.recv().await.unwrap();
        watcher.await.unwrap();
        // Activity at 6s; idle reaches 10s at 16s, first seen at the 17.5s check.
        assert_eq!(started.elapsed(), Duration::from_millis(17_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_watch_stops_on_shutdown() {
        let state = Arc::new(DaemonState::new(Duration::from_secs(10)));
        let (shutdown_tx, _) = broadcast::channel(4);
        let watcher = tokio::spawn(idle_watch(Arc::clone(&state), shutdown_tx.clone()));

        tokio::task::yield_now().await;
        shutdown_tx.send(ShutdownSignal).unwrap();
        watcher.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_fails_without_credentials() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut settings = EsmConfig::default();
        settings.daemon.install_root = dir.path().to_path_buf();

        let err = Daemon::new(settings).run().await.unwrap_err();
        assert!(matches!(err, DaemonError::Tls(TlsError::Read { .. })));
    }
}
