//! # Errors
//!
//! Larder reports failures through one structured error type that every
//! transport can render the same way:
//! - a stable status code and class name per failure kind
//! - carried through `anyhow::Error` so library layers can add context
//! - transport-agnostic (the HTTP crate decides how to serialize)

use std::fmt;

use anyhow::Error as AnyError;
use serde_json::{json, Value};

/// Failure classes and the status each one maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    NotAuthenticated,
    NotFound,
    PayloadTooLarge,
    UnsupportedMediaType,
    GeneralError,
    Unavailable,
}

impl ErrorKind {
    /// `(code, name, className)`
    fn meta(&self) -> (u16, &'static str, &'static str) {
        match self {
            ErrorKind::BadRequest => (400, "BadRequest", "bad-request"),
            ErrorKind::NotAuthenticated => (401, "NotAuthenticated", "not-authenticated"),
            ErrorKind::NotFound => (404, "NotFound", "not-found"),
            ErrorKind::PayloadTooLarge => (413, "PayloadTooLarge", "payload-too-large"),
            ErrorKind::UnsupportedMediaType => {
                (415, "UnsupportedMediaType", "unsupported-media-type")
            }
            ErrorKind::GeneralError => (500, "GeneralError", "general-error"),
            ErrorKind::Unavailable => (503, "Unavailable", "unavailable"),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.meta().0
    }

    pub fn name(&self) -> &'static str {
        self.meta().1
    }

    pub fn class_name(&self) -> &'static str {
        self.meta().2
    }

    /// Whether the caller can fix the request and try again.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

/// A structured Larder error that can live inside `anyhow::Error`.
#[derive(Debug)]
pub struct LarderError {
    pub kind: ErrorKind,
    pub message: String,
    pub data: Option<Value>,
    pub errors: Option<Value>,
    pub source: Option<AnyError>,
}

impl LarderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            data: None,
            errors: None,
            source: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_errors(mut self, errors: Value) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    /// Convert into `anyhow::Error`.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// A copy suitable for returning to clients: the `source` chain is dropped,
    /// and server-side messages are replaced by a generic one.
    pub fn sanitize_for_client(&self) -> LarderError {
        let message = if self.kind.is_client_error() {
            self.message.clone()
        } else {
            match self.kind {
                ErrorKind::Unavailable => "Storage backend unavailable, please retry".to_string(),
                _ => "Internal storage error, please retry".to_string(),
            }
        };

        LarderError {
            kind: self.kind,
            message,
            data: self.data.clone(),
            errors: self.errors.clone(),
            source: None,
        }
    }

    /// JSON payload for transports.
    pub fn to_json(&self) -> Value {
        let mut base = json!({
            "name": self.name(),
            "message": self.message,
            "code": self.code(),
            "className": self.class_name(),
        });

        if let Some(d) = &self.data {
            base["data"] = d.clone();
        }
        if let Some(e) = &self.errors {
            base["errors"] = e.clone();
        }
        base
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }
    pub fn not_authenticated(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotAuthenticated, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::PayloadTooLarge, msg)
    }
    pub fn unsupported_media_type(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedMediaType, msg)
    }
    pub fn general_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::GeneralError, msg)
    }
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, msg)
    }
}

impl fmt::Display for LarderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.code(), self.message)
    }
}

impl std::error::Error for LarderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}
