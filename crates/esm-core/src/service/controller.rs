//! The controller trait and the per-request view handed to it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Bytes;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use super::{Action, BoxError};
use crate::BoxFuture;
use crate::error::ApiError;

/// Code sent when a controller enables an action it does not handle.
pub const ACTION_NOT_IMPLEMENTED: &str = "action-not-implemented";

/// A named resource exposing some of the fixed CRUD actions.
///
/// Implementations are built by a [`ControllerFactory`](super::ControllerFactory),
/// registered under [`name`](Controller::name), and get one route per
/// enabled action.
pub trait Controller: Send + Sync {
    /// Unique name; substituted for `{resource}` in route templates.
    fn name(&self) -> &str;

    /// Names of the actions this controller serves.
    fn enabled_actions(&self) -> &[&str];

    /// Prepare the controller before its routes are compiled.
    fn load(&self) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin(async { Ok(()) })
    }

    /// Handle one request for an enabled action.
    fn handle(&self, action: Action, request: ActionRequest) -> BoxFuture<'_, Result<Reply, ApiError>> {
        let _ = request;
        let message = format!(
            "controller `{}` enables `{}` but does not implement it",
            self.name(),
            action
        );
        Box::pin(async move {
            Err(ApiError::with_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                ACTION_NOT_IMPLEMENTED,
                message,
            ))
        })
    }
}

/// What a handler produced when it did not send the response itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Json(serde_json::Value),
    /// No body; only the action's default status.
    Empty,
}

impl Reply {
    /// Serialize a handler result.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, ApiError> {
        serde_json::to_value(value)
            .map(Reply::Json)
            .map_err(ApiError::from_source)
    }
}

/// Sends a response ahead of the handler's completion.
///
/// At most one response is ever sent; later sends return `false`.
#[derive(Clone)]
pub struct Responder {
    slot: Arc<Mutex<Option<oneshot::Sender<Response>>>>,
}

impl Responder {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        let responder = Self {
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (responder, rx)
    }

    /// Send `response` now. Returns whether it was delivered.
    pub fn send(&self, response: impl IntoResponse) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => tx.send(response.into_response()).is_ok(),
            None => false,
        }
    }

    pub fn is_sent(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("sent", &self.is_sent())
            .finish()
    }
}

/// One inbound request, as seen by a controller.
#[derive(Debug)]
pub struct ActionRequest {
    id: Option<String>,
    headers: HeaderMap,
    query: HashMap<String, String>,
    body: Bytes,
    responder: Responder,
}

impl ActionRequest {
    pub(crate) fn new(
        id: Option<String>,
        headers: HeaderMap,
        query: HashMap<String, String>,
        body: Bytes,
        responder: Responder,
    ) -> Self {
        Self {
            id,
            headers,
            query,
            body,
            responder,
        }
    }

    /// The `:id` path parameter, when the route has one.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// A header the request cannot proceed without.
    pub fn require_header(&self, name: &str) -> Result<&str, ApiError> {
        match self.header(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ApiError::bad_request(
                "bad-request",
                format!("missing required header `{name}`"),
            )),
        }
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ApiError::bad_request("bad-request", format!("invalid request body: {e}"))
        })
    }

    pub fn responder(&self) -> &Responder {
        &self.responder
    }
}
