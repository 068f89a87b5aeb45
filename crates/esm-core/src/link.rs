//! Symlink a module into a project's `es-modules/<organization>/<name>`.

use std::path::{Component, Path, PathBuf};

use esm_config::ModuleFile;
use tracing::info;

use crate::controllers::module::ModuleResolver;
use crate::error::ApiError;
use crate::types::LinkResponse;

/// Directory under a project that holds linked modules.
pub const MODULES_DIR: &str = "es-modules";

/// Link the module at `from` into the project at `to`.
///
/// An existing symlink at the destination is replaced (or kept, when it
/// already points at `from`); any other existing entry is a conflict.
pub async fn link_module(from: &Path, to: &Path) -> Result<LinkResponse, ApiError> {
    if same_path(from, to).await {
        return Err(ApiError::conflict(
            "link-identical-paths",
            format!("cannot link {} into itself", from.display()),
        ));
    }

    let source = ModuleResolver::locate(from).await?;
    let module = ModuleFile::new(&source);
    module.load().await?;
    let (organization, name) = match (module.organization(), module.name()) {
        (Some(organization), Some(name)) => (organization, name),
        _ => {
            return Err(ApiError::bad_request(
                "module-incomplete",
                format!(
                    "module {} needs both a name and an organization to be linked",
                    source.display()
                ),
            ));
        }
    };
    for part in [&organization, &name] {
        if !is_single_component(part) {
            return Err(ApiError::bad_request(
                "module-incomplete",
                format!("`{part}` cannot be used as a directory name"),
            ));
        }
    }

    let target = match tokio::fs::metadata(to).await {
        Ok(metadata) if metadata.is_dir() => tokio::fs::canonicalize(to).await?,
        _ => {
            return Err(ApiError::not_found(
                "target-not-found",
                format!("{} is not a directory", to.display()),
            ));
        }
    };

    let link = target.join(MODULES_DIR).join(&organization).join(&name);
    let created = place_link(&source, &link).await?;
    info!(
        source = %source.display(),
        link = %link.display(),
        created,
        "linked module"
    );

    Ok(LinkResponse {
        source,
        target,
        link,
        created,
    })
}

/// Returns `false` when `link` already pointed at `source`.
async fn place_link(source: &Path, link: &Path) -> Result<bool, ApiError> {
    match tokio::fs::symlink_metadata(link).await {
        Ok(existing) if existing.file_type().is_symlink() => {
            if tokio::fs::read_link(link).await? == source {
                return Ok(false);
            }
            tokio::fs::remove_file(link).await?;
        }
        Ok(_) => {
            return Err(ApiError::conflict(
                "link-target-occupied",
                format!("{} exists and is not a link", link.display()),
            ));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    if let Some(parent) = link.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    symlink_dir(source, link).await?;
    Ok(true)
}

#[cfg(unix)]
async fn symlink_dir(source: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(source, link).await
}

#[cfg(windows)]
async fn symlink_dir(source: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink_dir(source, link).await
}

async fn same_path(a: &Path, b: &Path) -> bool {
    canonical_or_raw(a).await == canonical_or_raw(b).await
}

async fn canonical_or_raw(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf())
}

fn is_single_component(part: &str) -> bool {
    let mut components = Path::new(part).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
