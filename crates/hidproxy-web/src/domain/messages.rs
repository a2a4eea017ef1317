//! What a client can ask the device for, and what it gets back.
//!
//! # Message flow
//!
//! ```text
//! HTTP handler → WebRequest  → executor D
//! HTTP handler ← WebResponse ← executor D   (or WebError)
//! ```
//!
//! `/status` and `/unseal` answer with JSON ([`StatusReport`],
//! [`UnsealResult`]); `/macros.txt` carries the textual macro format both
//! ways.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

// ── Requests ──────────────────────────────────────────────────────────────────

/// A request for executor D.
pub enum WebRequest {
    /// Serialize every macro as `macros.txt`.
    GetMacros,
    /// Parse the text and replace every stored macro with its contents.
    PutMacros(String),
    Status,
    /// Validate a password given as keycodes, exactly as if it had been typed
    /// on the physical keyboard.
    Unseal { password: Zeroizing<Vec<u8>> },
}

impl fmt::Debug for WebRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebRequest::GetMacros => f.write_str("GetMacros"),
            WebRequest::PutMacros(text) => write!(f, "PutMacros({} bytes)", text.len()),
            WebRequest::Status => f.write_str("Status"),
            WebRequest::Unseal { .. } => f.write_str("Unseal { password: <redacted> }"),
        }
    }
}

// ── Responses ─────────────────────────────────────────────────────────────────

/// A successful answer from executor D.
#[derive(Debug, Clone, PartialEq)]
pub enum WebResponse {
    Macros(String),
    /// Number of macros written by a `PutMacros`.
    Stored(usize),
    Status(StatusReport),
    Unseal(UnsealResult),
}

/// Body of `GET /status`.
///
/// ```json
/// {"sealed":false,"web_enabled":true,"expires_in":241000,"macros":3,"uptime":815}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub sealed: bool,
    pub web_enabled: bool,
    /// Milliseconds left in the web access window; 0 when closed.
    pub expires_in: u64,
    pub macros: usize,
    /// Seconds since boot.
    pub uptime: u64,
}

/// Body of `POST /unseal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsealResult {
    pub success: bool,
    pub message: String,
}

impl UnsealResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebError {
    /// The web access window is closed; open it from the keyboard first.
    #[error("web access is not enabled")]
    AccessDenied,

    /// The device is sealed, so private macros cannot be read or written.
    #[error("device is sealed")]
    Locked,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Executor D is gone or did not answer.
    #[error("device unavailable")]
    Unavailable,
}

impl WebError {
    /// The HTTP status code that carries this error.
    pub fn status_code(&self) -> u16 {
        match self {
            WebError::AccessDenied => 403,
            WebError::Locked => 423,
            WebError::BadRequest(_) => 400,
            WebError::Storage(_) => 500,
            WebError::Unavailable => 503,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_the_gate_order() {
        assert_eq!(WebError::AccessDenied.status_code(), 403);
        assert_eq!(WebError::Locked.status_code(), 423);
        assert_eq!(WebError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(WebError::Unavailable.status_code(), 503);
    }

    #[test]
    fn test_status_report_serializes_with_expected_fields() {
        // Arrange
        let report = StatusReport {
            sealed: true,
            web_enabled: false,
            expires_in: 0,
            macros: 2,
            uptime: 10,
        };

        // Act
        let json = serde_json::to_value(&report).unwrap();

        // Assert
        assert_eq!(json["sealed"], true);
        assert_eq!(json["web_enabled"], false);
        assert_eq!(json["expires_in"], 0);
        assert_eq!(json["macros"], 2);
        assert_eq!(json["uptime"], 10);
    }

    #[test]
    fn test_debug_never_prints_the_password() {
        let req = WebRequest::Unseal {
            password: Zeroizing::new(b"hunter2".to_vec()),
        };
        let shown = format!("{req:?}");
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("104"));
    }
}
