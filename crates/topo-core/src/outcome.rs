//! Per-action outcomes and the error taxonomy

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why an action did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad reference, self-loop or invalid kind pairing; nothing was sent
    ValidationRejected,
    /// Malformed tool-call arguments
    ParseError,
    UnknownTool,
    /// Transport failure or backend-reported error
    BackendFailure,
    /// Backend result was ambiguous; state was not advanced
    UnconfirmedState,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationRejected => "validation_rejected",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::UnknownTool => "unknown_tool",
            ErrorKind::BackendFailure => "backend_failure",
            ErrorKind::UnconfirmedState => "unconfirmed_state",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ActionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Terminal result of one action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub correlation_id: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ActionError>,
}

impl Outcome {
    pub fn ok(correlation_id: impl Into<String>, result: Value) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(correlation_id: impl Into<String>, error: ActionError) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            success: false,
            result: None,
            error: Some(error),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
