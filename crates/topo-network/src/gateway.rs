//! The backend gateway seam

use async_trait::async_trait;
use topo_core::{ActionBody, BackendResult, TopologyState};

use crate::error::GatewayError;

/// Stateless adapter to the emulation backend.
///
/// `execute` performs exactly one round-trip and never retries. Backend
/// refusals come back as `Ok(BackendResult { ok: false, .. })`; `Err` means no
/// answer was obtained.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    async fn execute(&self, action: &ActionBody) -> Result<BackendResult, GatewayError>;

    /// Authoritative full topology, used for bootstrap and recovery
    async fn fetch_snapshot(&self) -> Result<TopologyState, GatewayError>;
}
