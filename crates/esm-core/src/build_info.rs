//! Build metadata embedded by `build.rs`.

use chrono::{DateTime, Utc};

/// Short git commit hash, suffixed with `-dirty` for modified trees.
pub const GIT_HASH: &str = env!("ESM_GIT_HASH");

/// Unix epoch seconds at build time (or `SOURCE_DATE_EPOCH`).
pub const BUILD_TIMESTAMP: &str = env!("ESM_BUILD_TIMESTAMP");

/// Cargo profile the daemon was built with.
pub const BUILD_PROFILE: &str = env!("ESM_BUILD_PROFILE");

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `"<version> (<hash>, <profile>)"`, as reported by `application-status`.
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}

/// The build time, if the embedded timestamp parses.
pub fn built_at() -> Option<DateTime<Utc>> {
    let secs = BUILD_TIMESTAMP.parse::<i64>().ok()?;
    DateTime::from_timestamp(secs, 0)
}
