//! topo-tools: Topology Tools for LLM Agents
//!
//! - `tool`: the closed tool catalogue with JSON schemas
//! - `args`: typed argument parsing and translation into requests
//! - `adapter`: tool calls in, one tool response per call out

pub mod adapter;
pub mod args;
pub mod tool;

pub use adapter::{ToolArguments, ToolCall, ToolCallAdapter, ToolResponse};
pub use args::{translate, ArgsError};
pub use tool::{ToolDefinition, ToolName};
