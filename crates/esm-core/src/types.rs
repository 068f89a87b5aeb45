//! Shared request/response types for the daemon's HTTP API.
//!
//! These types are serialized as JSON over TLS. Both the daemon and the
//! client (CLI) use them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Value of [`StatusResponse::server`] for esm daemons.
pub const SERVER_NAME: &str = "esm";

/// Wire protocol version reported by the status endpoint.
pub const PROTOCOL_VERSION: u32 = 1;

/// Path of the status endpoint.
pub const STATUS_PATH: &str = "/esm-status";

/// `GET /esm-status` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub server: String,
    pub loaded: bool,
    pub version: u32,
}

impl StatusResponse {
    /// Whether the peer identifies as an esm daemon.
    pub fn is_esm(&self) -> bool {
        self.server == SERVER_NAME
    }
}

/// `GET /application-status` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationStatus {
    pub status: String,
    pub uptime: u64,
    pub started: String,
    pub build: String,
}

/// `GET /module-yml` with a `key` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleValue {
    pub value: esm_config::ConfigNode,
}

/// `PUT /module-yml/:id?` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleValueUpdate {
    /// Dotted path; taken from the route id when present.
    #[serde(default)]
    pub key: Option<String>,
    pub value: esm_config::ConfigNode,
}

/// `PUT /module-yml/:id?` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleValueUpdated {
    pub key: String,
    pub value: esm_config::ConfigNode,
}

/// `POST /link` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRequest {
    /// Module directory to link.
    pub from: PathBuf,
    /// Project directory receiving the link under `es-modules/`.
    pub to: PathBuf,
}

/// `POST /link` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkResponse {
    pub source: PathBuf,
    pub target: PathBuf,
    pub link: PathBuf,
    /// `false` when an identical link already existed.
    pub created: bool,
}
