//! `application-status`: liveness and build details of the running daemon.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::BoxFuture;
use crate::error::ApiError;
use crate::service::{Action, ActionRequest, BoxError, Controller, Reply};
use crate::types::ApplicationStatus;

pub struct ApplicationStatusController {
    started_at: Instant,
    started: DateTime<Utc>,
}

impl ApplicationStatusController {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            started: Utc::now(),
        }
    }

    pub fn build() -> Result<Arc<dyn Controller>, BoxError> {
        Ok(Arc::new(Self::new()))
    }

    pub fn status(&self) -> ApplicationStatus {
        ApplicationStatus {
            status: "ready".to_string(),
            uptime: self.started_at.elapsed().as_secs(),
            started: self.started.to_rfc3339_opts(SecondsFormat::Secs, true),
            build: crate::build_info::version_string(),
        }
    }
}

impl Default for ApplicationStatusController {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller for ApplicationStatusController {
    fn name(&self) -> &str {
        "application-status"
    }

    fn enabled_actions(&self) -> &[&str] {
        &["list"]
    }

    fn handle(&self, action: Action, _request: ActionRequest) -> BoxFuture<'_, Result<Reply, ApiError>> {
        Box::pin(async move {
            match action {
                Action::List => Reply::json(&self.status()),
                other => Err(ApiError::internal(format!(
                    "application-status does not serve {other}"
                ))),
            }
        })
    }
}
