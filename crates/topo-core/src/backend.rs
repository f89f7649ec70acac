//! Normalized backend result shape
//!
//! Every gateway round-trip, whatever the transport, is folded into a
//! [`BackendResult`]. Whether the state cache may advance is decided by
//! [`BackendResult::confirmation`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendResult {
    pub ok: bool,
    #[serde(default)]
    pub data: Value,
    /// HTTP status or the transport's equivalent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Backend-provided failure detail, passed through verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// How a result relates to backend state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// The backend applied the operation
    Confirmed,
    /// The backend refused the operation
    Rejected(String),
    /// Success was claimed but cannot be trusted; state must not advance
    Ambiguous(String),
}

impl Confirmation {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Confirmation::Confirmed)
    }
}

impl BackendResult {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data,
            status: Some(200),
            detail: None,
        }
    }

    pub fn failure(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: Value::Null,
            status,
            detail: Some(detail.into()),
        }
    }

    pub fn confirmation(&self) -> Confirmation {
        if !self.ok {
            let detail = match (&self.detail, self.status) {
                (Some(detail), _) => detail.clone(),
                (None, Some(status)) => format!("backend returned status {}", status),
                (None, None) => "backend reported failure".to_string(),
            };
            return Confirmation::Rejected(detail);
        }

        if let Some(status) = self.status {
            if !(200..300).contains(&status) {
                return Confirmation::Ambiguous(format!(
                    "backend claimed success with status {}",
                    status
                ));
            }
        }

        // backends answer {"status": "ok"}; anything else in that field is not a confirmation
        if let Some(status) = self.data.get("status").and_then(Value::as_str) {
            if !status.eq_ignore_ascii_case("ok") {
                return Confirmation::Ambiguous(format!(
                    "backend reported status '{}'",
                    status
                ));
            }
        }

        Confirmation::Confirmed
    }
}
