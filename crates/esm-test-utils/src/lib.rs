#![deny(unsafe_code)]

//! Shared test utilities for the esm workspace.
//!
//! Provides settings builders, self-signed credentials, temporary module
//! directories, an in-process daemon router, and tracing helpers so that
//! crate tests stay concise.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! esm-test-utils = { workspace = true }
//! ```

pub mod credentials;
pub mod daemon;
pub mod module;
pub mod settings;
pub mod tracing_setup;
