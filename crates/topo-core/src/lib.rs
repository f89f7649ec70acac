//! Core types and utilities for the topology orchestrator
//!
//! # Modules
//!
//! - `action`: Requests, atomic actions and their footprints
//! - `allocator`: Node id and layout position allocation
//! - `backend`: Normalized backend result shape
//! - `config`: Environment loading and explicit configuration structs
//! - `error`: Error types and Result alias
//! - `outcome`: Per-action outcomes and the error taxonomy
//! - `types`: Nodes, links and the topology state

pub mod action;
pub mod allocator;
pub mod backend;
pub mod config;
pub mod error;
pub mod outcome;
pub mod types;

// Re-exports
pub use action::{
    Action, ActionBody, CommandSpec, DeleteTarget, Footprint, LinkSelector, LinkSpec, NodeBatch,
    NodeDraft, Request, RequestBody,
};
pub use allocator::{Allocator, IdAllocator};
pub use backend::{BackendResult, Confirmation};
pub use config::{GatewayConfig, LayoutConfig};
pub use error::{Error, Result};
pub use outcome::{ActionError, ErrorKind, Outcome};
pub use types::*;
