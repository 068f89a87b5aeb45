//! Per-route request wrapper around a controller handler.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{debug, error, warn};

use super::controller::{ActionRequest, Reply, Responder};
use super::{Action, Controller};
use crate::error::ApiError;

/// Largest request body a controller will see.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

type Outcome = Result<Result<Reply, ApiError>, JoinError>;

/// The handler a compiled route dispatches to.
#[derive(Clone)]
pub(crate) struct Target {
    pub controller: Arc<dyn Controller>,
    pub action: Action,
    pub default_status: StatusCode,
}

enum First {
    Sent(Response),
    Finished(Outcome),
}

/// Run the handler on its own task and turn its outcome into one response.
///
/// A response sent early through the [`Responder`] wins; a later failure of
/// the same handler is only logged.
pub(crate) async fn dispatch(target: Target, id: Option<String>, req: Request) -> Response {
    let Target {
        controller,
        action,
        default_status,
    } = target;
    let controller_name = controller.name().to_string();

    let (parts, body) = req.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            return ApiError::bad_request("bad-request", format!("failed to read request body: {e}"))
                .into_response();
        }
    };
    let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(query)| query)
        .unwrap_or_default();

    let (responder, mut sent_rx) = Responder::channel();
    let request = ActionRequest::new(id, parts.headers, query, body, responder);

    debug!(controller = %controller_name, %action, "dispatching request");
    let mut task = tokio::spawn(async move { controller.handle(action, request).await });

    let first = tokio::select! {
        biased;
        sent = &mut sent_rx => match sent {
            Ok(response) => First::Sent(response),
            Err(_) => First::Finished((&mut task).await),
        },
        outcome = &mut task => First::Finished(outcome),
    };

    match first {
        First::Sent(response) => {
            tokio::spawn(async move {
                log_after_send(&controller_name, action, task.await);
            });
            response
        }
        First::Finished(outcome) => {
            if let Ok(response) = sent_rx.try_recv() {
                log_after_send(&controller_name, action, outcome);
                return response;
            }
            respond(&controller_name, action, default_status, outcome)
        }
    }
}

fn respond(controller: &str, action: Action, default_status: StatusCode, outcome: Outcome) -> Response {
    match outcome {
        Ok(Ok(Reply::Json(value))) => (default_status, Json(value)).into_response(),
        Ok(Ok(Reply::Empty)) => default_status.into_response(),
        Ok(Err(err)) => {
            if err.status().is_server_error() {
                error!(controller, %action, code = err.code(), error = %err, "request failed");
            } else {
                debug!(controller, %action, code = err.code(), error = %err, "request rejected");
            }
            err.into_response()
        }
        Err(join) => {
            error!(controller, %action, error = %join, "request handler aborted");
            ApiError::internal(format!("request handler for `{controller}.{action}` aborted"))
                .into_response()
        }
    }
}

fn log_after_send(controller: &str, action: Action, outcome: Outcome) {
    match outcome {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            warn!(controller, %action, code = err.code(), error = %err, "request failed after its response was sent");
        }
        Err(join) => {
            error!(controller, %action, error = %join, "request handler aborted after its response was sent");
        }
    }
}
