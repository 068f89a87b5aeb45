//! In-process daemon routers for tests.
//!
//! [`TestServer`] serves the same router the daemon binds, without TLS or a
//! socket, so tests can drive it with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use esm_core::controllers::builtin_factories;
use esm_core::daemon::status_router;
use esm_core::service::ControllerFactory;
use esm_core::{DaemonState, Service};
use tower::ServiceExt;

/// The daemon's status router with its shared state.
pub struct TestServer {
    pub state: Arc<DaemonState>,
    pub router: Router,
}

impl TestServer {
    /// A server that has not installed its service router yet.
    pub fn loading() -> Self {
        let state = Arc::new(DaemonState::new(Duration::from_secs(10)));
        let router = status_router(Arc::clone(&state));
        Self { state, router }
    }

    /// A ready server with the built-in controllers.
    pub async fn loaded() -> Self {
        Self::with_controllers(&builtin_factories()).await
    }

    /// A ready server with the given controllers.
    pub async fn with_controllers(factories: &[ControllerFactory]) -> Self {
        let server = Self::loading();
        let service = Service::load(factories)
            .await
            .expect("failed to load test controllers");
        server.state.mark_loaded(service.router());
        server
    }

    /// Send one request and decode the JSON response (`Null` when empty).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .expect("failed to read response body");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response is not JSON")
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, serde_json::Value) {
        self.send(Method::GET, uri, headers, None).await
    }
}
