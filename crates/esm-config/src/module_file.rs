//! `module.yml` access.
//!
//! Every esm module keeps its metadata (name, organization, version,
//! commands, npm dependencies) in a `module.yml` file at its root. A
//! [`ModuleFile`] owns one such file for one load/save cycle:
//!
//! ```text
//! new ──▶ exists? ──▶ load ──▶ get / set ... ──▶ save ──▶ (unloaded)
//! ```
//!
//! `load`, `save`, and `exists` are mutually exclusive on one instance; an
//! overlapping call fails with [`ModuleFileError::Busy`] instead of waiting.
//! There is no cross-instance or cross-process locking.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::tree::{ConfigNode, ConfigPath, TreeError};

/// File name of the module metadata file.
pub const MODULE_FILE_NAME: &str = "module.yml";

/// Errors from loading, saving, or querying a module file.
#[derive(Debug, thiserror::Error)]
pub enum ModuleFileError {
    #[error("cannot {operation} '{}', the file is busy", path.display())]
    Busy {
        path: PathBuf,
        operation: &'static str,
    },

    #[error("cannot load '{}', the file was already loaded", path.display())]
    AlreadyLoaded { path: PathBuf },

    #[error("cannot {operation} '{}', the file was not loaded", path.display())]
    NotLoaded {
        path: PathBuf,
        operation: &'static str,
    },

    #[error("failed to load '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to stringify '{}': {source}", path.display())]
    Serialize {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to save '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to inspect '{}': {source}", path.display())]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("the file '{}' is not a regular file", path.display())]
    NotRegularFile { path: PathBuf },

    #[error("the file '{}' is not writable: {source}", path.display())]
    NotWritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("in '{}': {source}", path.display())]
    Tree { path: PathBuf, source: TreeError },
}

/// Releases the busy flag when dropped, on success and error paths alike.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Accessor for one module's `module.yml`.
#[derive(Debug)]
pub struct ModuleFile {
    project_dir: PathBuf,
    file_path: PathBuf,
    busy: AtomicBool,
    tree: RwLock<Option<ConfigNode>>,
}

impl ModuleFile {
    /// Accessor for `<project_dir>/module.yml`. Does not touch the filesystem.
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let project_dir = project_dir.into();
        let file_path = project_dir.join(MODULE_FILE_NAME);
        Self {
            project_dir,
            file_path,
            busy: AtomicBool::new(false),
            tree: RwLock::new(None),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn is_loaded(&self) -> bool {
        self.read_tree().is_some()
    }

    fn read_tree(&self) -> RwLockReadGuard<'_, Option<ConfigNode>> {
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tree(&self) -> RwLockWriteGuard<'_, Option<ConfigNode>> {
        self.tree.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self, operation: &'static str) -> Result<BusyGuard<'_>, ModuleFileError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ModuleFileError::Busy {
                path: self.file_path.clone(),
                operation,
            });
        }
        Ok(BusyGuard { flag: &self.busy })
    }

    /// Whether the file exists as a regular, readable and writable file.
    ///
    /// A missing file is `Ok(false)`. Anything else that prevents using the
    /// file (a directory in its place, missing permissions) is an error.
    pub async fn exists(&self) -> Result<bool, ModuleFileError> {
        let _busy = self.claim("check")?;

        let metadata = match tokio::fs::metadata(&self.file_path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(source) => {
                return Err(ModuleFileError::Stat {
                    path: self.file_path.clone(),
                    source,
                });
            }
        };

        if !metadata.is_file() {
            return Err(ModuleFileError::NotRegularFile {
                path: self.file_path.clone(),
            });
        }

        match tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.file_path)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ModuleFileError::NotWritable {
                path: self.file_path.clone(),
                source,
            }),
        }
    }

    /// Read and parse the file. An instance loads at most once per save cycle.
    pub async fn load(&self) -> Result<(), ModuleFileError> {
        let _busy = self.claim("load")?;
        if self.is_loaded() {
            return Err(ModuleFileError::AlreadyLoaded {
                path: self.file_path.clone(),
            });
        }

        let bytes = tokio::fs::read(&self.file_path)
            .await
            .map_err(|source| ModuleFileError::Read {
                path: self.file_path.clone(),
                source,
            })?;

        let tree: ConfigNode =
            serde_yaml::from_slice(&bytes).map_err(|source| ModuleFileError::Parse {
                path: self.file_path.clone(),
                source,
            })?;

        *self.write_tree() = Some(tree);
        debug!(path = %self.file_path.display(), "module file loaded");
        Ok(())
    }

    /// Serialize and write the tree, then unload it.
    ///
    /// Saving requires a loaded (or initialized) tree, so an instance cannot
    /// be saved twice without loading again.
    pub async fn save(&self) -> Result<(), ModuleFileError> {
        let _busy = self.claim("save")?;

        let text = {
            let tree = self.read_tree();
            let Some(tree) = tree.as_ref() else {
                return Err(ModuleFileError::NotLoaded {
                    path: self.file_path.clone(),
                    operation: "save",
                });
            };
            serde_yaml::to_string(tree).map_err(|source| ModuleFileError::Serialize {
                path: self.file_path.clone(),
                source,
            })?
        };

        tokio::fs::write(&self.file_path, text)
            .await
            .map_err(|source| ModuleFileError::Write {
                path: self.file_path.clone(),
                source,
            })?;

        *self.write_tree() = None;
        debug!(path = %self.file_path.display(), "module file saved");
        Ok(())
    }

    /// Fill the instance with a boilerplate module definition.
    pub fn initialize(&self) -> Result<(), ModuleFileError> {
        let mut tree = self.write_tree();
        if tree.is_some() {
            return Err(ModuleFileError::AlreadyLoaded {
                path: self.file_path.clone(),
            });
        }

        let mut root = ConfigNode::mapping();
        for (key, value) in [
            ("name", "<my-module>"),
            ("organization", "<my-organization>"),
            ("version", "1.0.0"),
        ] {
            root.set(&ConfigPath::parse(key), ConfigNode::from(value))
                .map_err(|source| ModuleFileError::Tree {
                    path: self.file_path.clone(),
                    source,
                })?;
        }
        *tree = Some(root);
        Ok(())
    }

    /// Load the file if it exists, otherwise start from the boilerplate.
    pub async fn load_or_create(&self) -> Result<(), ModuleFileError> {
        if self.exists().await? {
            self.load().await
        } else {
            self.initialize()
        }
    }

    /// Value at a dotted path.
    pub fn get(&self, path: &str) -> Result<ConfigNode, ModuleFileError> {
        let tree = self.read_tree();
        let root = tree.as_ref().ok_or_else(|| ModuleFileError::NotLoaded {
            path: self.file_path.clone(),
            operation: "read",
        })?;

        root.get(&ConfigPath::parse(path))
            .cloned()
            .map_err(|source| ModuleFileError::Tree {
                path: self.file_path.clone(),
                source,
            })
    }

    /// Whether [`get`](Self::get) would succeed.
    ///
    /// Does not distinguish a missing key from a structural mismatch; call
    /// `get` and inspect the error for that.
    pub fn has_value(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    /// Write a value at a dotted path. Returns `self` for chaining.
    pub fn set(
        &self,
        path: &str,
        value: impl Into<ConfigNode>,
    ) -> Result<&Self, ModuleFileError> {
        let mut tree = self.write_tree();
        let root = tree.as_mut().ok_or_else(|| ModuleFileError::NotLoaded {
            path: self.file_path.clone(),
            operation: "write",
        })?;

        root.set(&ConfigPath::parse(path), value.into())
            .map_err(|source| ModuleFileError::Tree {
                path: self.file_path.clone(),
                source,
            })?;
        Ok(self)
    }

    /// Snapshot of the whole tree, if loaded.
    pub fn data(&self) -> Option<ConfigNode> {
        self.read_tree().clone()
    }

    fn text(&self, path: &str) -> Option<String> {
        self.get(path).ok().and_then(|node| node.scalar_text())
    }

    pub fn name(&self) -> Option<String> {
        self.text("name")
    }

    pub fn organization(&self) -> Option<String> {
        self.text("organization")
    }

    pub fn version(&self) -> Option<String> {
        self.text("version")
    }

    /// `<organization>::<name>`, when both are set.
    pub fn identifier(&self) -> Option<String> {
        Some(format!("{}::{}", self.organization()?, self.name()?))
    }

    /// The `npm` entry, or an empty sequence.
    pub fn npm_dependencies(&self) -> ConfigNode {
        self.get("npm").unwrap_or_else(|_| ConfigNode::sequence())
    }

    pub fn has_command(&self, name: &str) -> bool {
        self.has_value(&format!("commands.{name}"))
    }

    pub fn command(&self, name: &str) -> Option<String> {
        self.text(&format!("commands.{name}"))
    }
}
