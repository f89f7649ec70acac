//! topo-network: Backend Gateways for the Topology Orchestrator
//!
//! This crate provides:
//! - `BackendGateway`: one network round-trip per validated action
//! - `MininetClient`: REST client for the Mininet GUI backend
//! - `InMemoryBackend`: self-contained backend with failure injection
//! - `GatewayError`: transport-level failures with remediation hints

pub mod client;
pub mod error;
pub mod gateway;
pub mod memory;

pub use client::MininetClient;
pub use error::GatewayError;
pub use gateway::BackendGateway;
pub use memory::{InMemoryBackend, InjectedFailure};
