//! `link`: symlink a module into a project.

use std::sync::Arc;

use crate::BoxFuture;
use crate::error::ApiError;
use crate::link::link_module;
use crate::service::{Action, ActionRequest, BoxError, Controller, Reply};
use crate::types::LinkRequest;

#[derive(Default)]
pub struct LinkController;

impl LinkController {
    pub fn build() -> Result<Arc<dyn Controller>, BoxError> {
        Ok(Arc::new(Self))
    }
}

impl Controller for LinkController {
    fn name(&self) -> &str {
        "link"
    }

    fn enabled_actions(&self) -> &[&str] {
        &["create"]
    }

    fn handle(&self, action: Action, request: ActionRequest) -> BoxFuture<'_, Result<Reply, ApiError>> {
        Box::pin(async move {
            if action != Action::Create {
                return Err(ApiError::internal(format!("link does not serve {action}")));
            }
            let body: LinkRequest = request.json()?;
            let outcome = link_module(&body.from, &body.to).await?;
            Reply::json(&outcome)
        })
    }
}
