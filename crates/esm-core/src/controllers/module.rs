//! Resolves the `module` request header to a loaded `module.yml`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::StatusCode;
use esm_config::{MODULE_FILE_NAME, ModuleFile};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ApiError;

/// Header naming the module directory.
pub const MODULE_HEADER: &str = "module";

/// Loaded module files keyed by canonical module directory.
#[derive(Default)]
pub struct ModuleResolver {
    cache: Mutex<HashMap<PathBuf, Arc<ModuleFile>>>,
}

impl ModuleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `dir` is a module directory and return its canonical path.
    pub async fn locate(dir: &Path) -> Result<PathBuf, ApiError> {
        let metadata = match tokio::fs::metadata(dir).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ApiError::not_found(
                    "module-not-found",
                    format!("module directory {} does not exist", dir.display()),
                ));
            }
            Err(e) => return Err(ApiError::from_source(e)),
        };
        if !metadata.is_dir() {
            return Err(ApiError::with_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                "module-not-a-directory",
                format!("{} is not a directory", dir.display()),
            ));
        }

        let canonical = tokio::fs::canonicalize(dir).await?;
        let module = ModuleFile::new(&canonical);
        if !module.exists().await? {
            return Err(ApiError::not_found(
                "module-not-found",
                format!("no {MODULE_FILE_NAME} in {}", canonical.display()),
            ));
        }
        Ok(canonical)
    }

    /// The loaded module file for `dir`, read from disk on first use.
    pub async fn resolve(&self, dir: &Path) -> Result<Arc<ModuleFile>, ApiError> {
        let canonical = Self::locate(dir).await?;
        let mut cache = self.cache.lock().await;
        if let Some(module) = cache.get(&canonical) {
            return Ok(Arc::clone(module));
        }

        let module = ModuleFile::new(&canonical);
        module.load().await?;
        debug!(module = %canonical.display(), "loaded module file");
        let module = Arc::new(module);
        cache.insert(canonical, Arc::clone(&module));
        Ok(module)
    }

    /// Drop the cached copy of `dir` so the next resolve re-reads it.
    pub async fn forget(&self, dir: &Path) {
        self.cache.lock().await.remove(dir);
    }

    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn module_dir(yaml: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(MODULE_FILE_NAME), yaml).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_resolve_caches_by_canonical_path() {
        let dir = module_dir("name: widgets\norganization: acme\n");
        let resolver = ModuleResolver::new();

        let first = resolver.resolve(dir.path()).await.unwrap();
        assert_eq!(first.name().as_deref(), Some("widgets"));
        let again = resolver.resolve(&dir.path().join(".")).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(resolver.cached().await, 1);

        resolver.forget(first.project_dir()).await;
        assert_eq!(resolver.cached().await, 0);
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = ModuleResolver::new()
            .resolve(&dir.path().join("absent"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "module-not-found");
    }

    #[tokio::test]
    async fn test_file_instead_of_directory() {
        let dir = module_dir("name: x\n");
        let err = ModuleResolver::locate(&dir.path().join(MODULE_FILE_NAME))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "module-not-a-directory");
    }

    #[tokio::test]
    async fn test_directory_without_module_file() {
        let dir = TempDir::new().unwrap();
        let err = ModuleResolver::locate(dir.path()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "module-not-found");
    }
}
