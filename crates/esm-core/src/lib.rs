#![deny(unsafe_code)]

//! esm core daemon runtime.
//!
//! Provides the long-lived resolution daemon that short-lived `esm` CLI
//! invocations talk to: the singleton lifecycle (lock, bind, probe, idle
//! shutdown), the TLS transport, the route compiler that turns controller
//! actions into REST endpoints, and the built-in controllers.

use std::future::Future;
use std::pin::Pin;

/// Boxed `Send` future returned by async methods of object-safe traits
/// such as [`service::Controller`] and [`singleton::StatusProbe`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Typed TLS client for the daemon's HTTP API.
pub mod client;
/// Built-in controllers: application status, module.yml access, links.
pub mod controllers;
/// Daemon lifecycle: startup, status route, idle shutdown.
pub mod daemon;
/// Structured request errors and the JSON error envelope.
pub mod error;
/// Symlink-based module linking.
pub mod link;
/// Tracing subscriber setup with an explicit sink.
pub mod logging;
/// Controller registry and action route compiler.
pub mod service;
/// Instance lock and readiness probing for the one-daemon-per-port rule.
pub mod singleton;
/// TLS credentials and the HTTPS accept loop.
pub mod transport;
/// Wire types shared by the daemon and its clients.
pub mod types;

pub use client::DaemonClient;
pub use daemon::{Daemon, DaemonError, DaemonState, RunOutcome};
pub use error::{ApiError, ErrorEnvelope};
pub use service::{Action, Controller, ControllerRegistry, Service, ServiceError};
