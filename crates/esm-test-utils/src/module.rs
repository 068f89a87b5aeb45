//! Temporary module directories.

use std::path::{Path, PathBuf};

use esm_config::MODULE_FILE_NAME;
use tempfile::TempDir;

/// A module directory with a `module.yml`, deleted on drop.
pub struct TestModule {
    dir: TempDir,
}

impl TestModule {
    /// A module whose `module.yml` holds `yaml`.
    pub fn with_yaml(yaml: &str) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        std::fs::write(dir.path().join(MODULE_FILE_NAME), yaml).expect("failed to write module.yml");
        Self { dir }
    }

    /// A module named `name` in `organization`.
    pub fn named(organization: &str, name: &str) -> Self {
        Self::with_yaml(&format!(
            "name: {name}\norganization: {organization}\nversion: 1.0.0\n"
        ))
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The path as sent in the `module` header.
    pub fn header(&self) -> String {
        self.path().display().to_string()
    }

    pub fn file_path(&self) -> PathBuf {
        self.path().join(MODULE_FILE_NAME)
    }

    /// Current contents of `module.yml`.
    pub fn read(&self) -> String {
        std::fs::read_to_string(self.file_path()).expect("failed to read module.yml")
    }
}
