//! topo-state: Topology State Management
//!
//! Provides:
//! - `TopologyCache`: the local mirror of confirmed backend topology
//! - `validate`: pre-dispatch checks of actions against that mirror

pub mod cache;
pub mod validator;

pub use cache::{Applied, TopologyCache};
pub use validator::{validate, Rejection};
