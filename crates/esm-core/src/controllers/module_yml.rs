//! `module-yml`: read and write values in a module's `module.yml`.

use std::path::Path;
use std::sync::Arc;

use esm_config::{ModuleFile, ModuleFileError};
use tracing::info;

use super::module::{MODULE_HEADER, ModuleResolver};
use crate::BoxFuture;
use crate::error::ApiError;
use crate::service::{Action, ActionRequest, BoxError, Controller, Reply};
use crate::types::{ModuleValue, ModuleValueUpdate, ModuleValueUpdated};

/// Header selecting a single dotted path for `list`.
pub const KEY_HEADER: &str = "key";

pub struct ModuleYmlController {
    modules: ModuleResolver,
}

impl ModuleYmlController {
    pub fn new() -> Self {
        Self {
            modules: ModuleResolver::new(),
        }
    }

    pub fn build() -> Result<Arc<dyn Controller>, BoxError> {
        Ok(Arc::new(Self::new()))
    }

    async fn list(&self, request: &ActionRequest) -> Result<Reply, ApiError> {
        let dir = request.require_header(MODULE_HEADER)?;
        let module = self.modules.resolve(Path::new(dir)).await?;

        match request.header(KEY_HEADER) {
            Some(key) => {
                let value = module.get(key).map_err(|e| key_not_found(key, e))?;
                Reply::json(&ModuleValue { value })
            }
            None => Reply::json(&module.data().unwrap_or_default()),
        }
    }

    async fn create_or_update(&self, request: &ActionRequest) -> Result<Reply, ApiError> {
        let dir = request.require_header(MODULE_HEADER)?;
        let update: ModuleValueUpdate = request.json()?;
        let key = request
            .id()
            .map(str::to_string)
            .or(update.key)
            .ok_or_else(|| {
                ApiError::bad_request("bad-request", "no key given in the path or the body")
            })?;

        let canonical = ModuleResolver::locate(Path::new(dir)).await?;
        let module = ModuleFile::new(&canonical);
        module.load().await?;
        module
            .set(&key, update.value.clone())
            .map_err(|e| invalid_key(&key, e))?;
        module.save().await?;
        self.modules.forget(&canonical).await;

        info!(module = %canonical.display(), %key, "updated module value");
        Reply::json(&ModuleValueUpdated {
            key,
            value: update.value,
        })
    }
}

impl Default for ModuleYmlController {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller for ModuleYmlController {
    fn name(&self) -> &str {
        "module-yml"
    }

    fn enabled_actions(&self) -> &[&str] {
        &["list", "createOrUpdate"]
    }

    fn handle(&self, action: Action, request: ActionRequest) -> BoxFuture<'_, Result<Reply, ApiError>> {
        Box::pin(async move {
            match action {
                Action::List => self.list(&request).await,
                Action::CreateOrUpdate => self.create_or_update(&request).await,
                other => Err(ApiError::internal(format!(
                    "module-yml does not serve {other}"
                ))),
            }
        })
    }
}

fn key_not_found(key: &str, err: ModuleFileError) -> ApiError {
    match err {
        ModuleFileError::Tree { .. } => {
            ApiError::not_found("key-not-found", format!("no value for the key {key}"))
                .with_data(serde_json::json!({ "key": key }))
                .caused_by(err)
        }
        other => ApiError::from(other),
    }
}

fn invalid_key(key: &str, err: ModuleFileError) -> ApiError {
    match err {
        ModuleFileError::Tree { .. } => {
            ApiError::bad_request("invalid-key", format!("cannot set the key {key}"))
                .with_data(serde_json::json!({ "key": key }))
                .caused_by(err)
        }
        other => ApiError::from(other),
    }
}
