//! topo-dispatch: Dispatch Orchestrator
//!
//! Turns ordered requests into ordered outcomes:
//! - expands batch requests through the allocator
//! - validates each action against the confirmed topology
//! - runs independent gateway calls concurrently in waves
//! - folds confirmed results into the cache in submission order

pub mod config;
pub mod orchestrator;
pub mod report;

pub use config::OrchestratorConfig;
pub use orchestrator::Orchestrator;
pub use report::{DispatchReport, RequestReport};
