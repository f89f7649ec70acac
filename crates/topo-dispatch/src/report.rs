//! Reconciled dispatch reports

use serde::{Deserialize, Serialize};
use std::ops::Range;

use topo_core::Outcome;

/// Aggregate view of one submitted request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestReport {
    pub correlation_id: String,
    /// True when every expanded action succeeded
    pub success: bool,
    /// Slice of [`DispatchReport::outcomes`] this request expanded into
    pub outcomes: Range<usize>,
}

/// Everything one dispatch call produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub batch_id: String,
    /// One per expanded action, in submission order
    pub outcomes: Vec<Outcome>,
    /// One per submitted request, in submission order
    pub requests: Vec<RequestReport>,
}

impl DispatchReport {
    pub fn success(&self) -> bool {
        self.requests.iter().all(|r| r.success)
    }

    /// Outcomes belonging to the `index`th request
    pub fn outcomes_for(&self, index: usize) -> &[Outcome] {
        self.requests
            .get(index)
            .and_then(|r| self.outcomes.get(r.outcomes.clone()))
            .unwrap_or(&[])
    }

    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }
}
