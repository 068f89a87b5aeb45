//! Request errors and the JSON error envelope.
//!
//! Controllers fail with an [`ApiError`]. Its [`ErrorKind`] decides the HTTP
//! status: caller mistakes map to 4xx, explicit statuses pass through, and
//! everything internal becomes `500` with the code `server-error`.

use std::borrow::Cow;
use std::error::Error as StdError;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Code sent for errors without an explicit status.
pub const SERVER_ERROR_CODE: &str = "server-error";

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Closed set of request error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid caller input (400).
    BadRequest,
    /// Module, key, or path absent (404).
    NotFound,
    /// Request conflicts with current state (409).
    Conflict,
    /// A controller-chosen status.
    Status(StatusCode),
    /// Unexpected failure; no explicit status.
    Internal,
}

impl ErrorKind {
    /// The explicit status carried by this kind, if any.
    pub fn status(self) -> Option<StatusCode> {
        match self {
            ErrorKind::BadRequest => Some(StatusCode::BAD_REQUEST),
            ErrorKind::NotFound => Some(StatusCode::NOT_FOUND),
            ErrorKind::Conflict => Some(StatusCode::CONFLICT),
            ErrorKind::Status(status) => Some(status),
            ErrorKind::Internal => None,
        }
    }
}

/// A failed request.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    kind: ErrorKind,
    code: Cow<'static, str>,
    message: String,
    data: Option<serde_json::Value>,
    #[source]
    source: Option<BoxError>,
}

impl ApiError {
    fn new(kind: ErrorKind, code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            data: None,
            source: None,
        }
    }

    pub fn bad_request(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, code, message)
    }

    pub fn not_found(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, message)
    }

    pub fn conflict(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, code, message)
    }

    /// An error with a controller-chosen status.
    pub fn with_status(
        status: StatusCode,
        code: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::Status(status), code, message)
    }

    /// An unexpected failure with a plain message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, SERVER_ERROR_CODE, message)
    }

    /// Wrap an unexpected error; its message becomes the envelope message.
    pub fn from_source(source: impl StdError + Send + Sync + 'static) -> Self {
        let mut err = Self::internal(source.to_string());
        err.source = Some(Box::new(source));
        err
    }

    /// Attach a cause without changing kind or message.
    pub fn caused_by(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach structured data for the envelope's `data` field.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }

    /// The status this error is sent with.
    pub fn status(&self) -> StatusCode {
        self.kind
            .status()
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Build the wire envelope for this error.
    pub fn envelope(&self) -> ErrorEnvelope {
        let code = match self.kind.status() {
            Some(_) => self.code.to_string(),
            None => SERVER_ERROR_CODE.to_string(),
        };
        ErrorEnvelope {
            message: self.message.clone(),
            status: self.status().as_u16(),
            code,
            data: self.data.clone(),
            stack: error_stack(self),
        }
    }
}

impl From<esm_config::ModuleFileError> for ApiError {
    fn from(err: esm_config::ModuleFileError) -> Self {
        Self::from_source(err)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::from_source(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.envelope().into_response()
    }
}

/// JSON body sent for every failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub message: String,
    pub status: u16,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub stack: Vec<String>,
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl std::fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.message, self.status, self.code)
    }
}

/// The error followed by its causes, one trimmed line each.
fn error_stack(err: &(dyn StdError + 'static)) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = Some(err);
    let mut first = true;
    while let Some(e) = current {
        let text = if first {
            format!("Error: {e}")
        } else {
            format!("caused by: {e}")
        };
        lines.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
        first = false;
        current = e.source();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kinds_map_to_statuses() {
        assert_eq!(
            ApiError::bad_request("bad-request", "nope").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::not_found("module-not-found", "nope").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::conflict("link-identical-paths", "nope").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::with_status(StatusCode::IM_A_TEAPOT, "teapot", "short and stout").status(),
            StatusCode::IM_A_TEAPOT
        );
        assert_eq!(
            ApiError::internal("boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_envelope_with_explicit_status() {
        let err = ApiError::not_found("key-not-found", "no value for the key name")
            .with_data(serde_json::json!({"key": "name"}));
        let envelope = err.envelope();
        assert_eq!(envelope.status, 404);
        assert_eq!(envelope.code, "key-not-found");
        assert_eq!(envelope.message, "no value for the key name");
        assert_eq!(envelope.data, Some(serde_json::json!({"key": "name"})));
        assert_eq!(envelope.stack, vec!["Error: no value for the key name"]);
    }

    #[test]
    fn test_internal_errors_normalize_to_server_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let envelope = ApiError::from(io).envelope();
        assert_eq!(envelope.status, 500);
        assert_eq!(envelope.code, SERVER_ERROR_CODE);
        assert_eq!(envelope.message, "disk on fire");
        assert_eq!(
            envelope.stack,
            vec!["Error: disk on fire", "caused by: disk on fire"]
        );
    }

    #[test]
    fn test_stack_lines_are_trimmed() {
        let err = ApiError::internal("first line\n    second line  \n");
        assert_eq!(
            err.envelope().stack,
            vec!["Error: first line", "second line"]
        );
    }

    #[test]
    fn test_envelope_omits_missing_data() {
        let json = serde_json::to_value(ApiError::internal("boom").envelope()).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["status"], 500);
        assert!(json["stack"].is_array());
    }
}
