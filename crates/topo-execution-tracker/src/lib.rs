//! Topology Execution Tracker - Per-Action Execution Monitoring
//!
//! Records every dispatched action from request to terminal outcome:
//! - Execution records with status transitions
//! - Event broadcast for live subscribers
//! - Prometheus counters and duration histogram

pub mod execution_record;
pub mod execution_tracker;
pub mod metrics;

pub use execution_record::{ActionRecord, ActionStatus};
pub use execution_tracker::{ActionEvent, ActionTracker};
pub use metrics::ActionMetrics;
