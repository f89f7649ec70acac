use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use topo_core::{ActionError, ErrorKind, Outcome};

/// Execution record for one dispatched action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Unique record ID
    pub record_id: String,

    /// Shared by every action of one dispatch call
    pub batch_id: String,

    /// Caller-facing correlation id (`call_1`, `call_1#2`)
    pub correlation_id: String,

    /// Action name (`create_node`, `create_link`, ...)
    pub action: String,

    pub status: ActionStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Set once the record reaches a terminal status
    pub finished_at: Option<DateTime<Utc>>,

    pub error: Option<ActionError>,

    /// Result payload or other details
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActionStatus {
    /// Accepted into a batch
    Requested,

    /// Handed to the backend gateway
    Dispatched,

    /// Confirmed by the backend
    Completed,

    /// Backend failure or unconfirmed result
    Failed,

    /// Refused before any network call
    Rejected,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Completed | ActionStatus::Failed | ActionStatus::Rejected
        )
    }

    /// Terminal status for an outcome
    pub fn for_outcome(outcome: &Outcome) -> Self {
        match outcome.error_kind() {
            None => ActionStatus::Completed,
            Some(ErrorKind::ValidationRejected | ErrorKind::ParseError | ErrorKind::UnknownTool) => {
                ActionStatus::Rejected
            }
            Some(ErrorKind::BackendFailure | ErrorKind::UnconfirmedState) => ActionStatus::Failed,
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Requested => write!(f, "Requested"),
            ActionStatus::Dispatched => write!(f, "Dispatched"),
            ActionStatus::Completed => write!(f, "Completed"),
            ActionStatus::Failed => write!(f, "Failed"),
            ActionStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

impl ActionRecord {
    pub fn new(batch_id: &str, correlation_id: &str, action: &str) -> Self {
        let now = Utc::now();
        Self {
            record_id: Uuid::new_v4().to_string(),
            batch_id: batch_id.to_string(),
            correlation_id: correlation_id.to_string(),
            action: action.to_string(),
            status: ActionStatus::Requested,
            created_at: now,
            updated_at: now,
            finished_at: None,
            error: None,
            metadata: serde_json::json!({}),
        }
    }

    pub fn update_status(&mut self, new_status: ActionStatus) {
        let now = Utc::now();
        self.status = new_status;
        self.updated_at = now;
        if new_status.is_terminal() {
            self.finished_at = Some(now);
        }
    }

    /// Fold a terminal outcome into the record
    pub fn finish(&mut self, outcome: &Outcome) {
        self.update_status(ActionStatus::for_outcome(outcome));
        self.error = outcome.error.clone();
        if let Some(result) = &outcome.result {
            self.metadata = serde_json::json!({ "result": result });
        }
    }

    /// Milliseconds from creation to finish, or to now while still open
    pub fn duration_ms(&self) -> u64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.created_at).num_milliseconds().max(0) as u64
    }
}
