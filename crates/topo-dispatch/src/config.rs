use topo_core::{Error, LayoutConfig, Result};

pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub layout: LayoutConfig,
    /// Upper bound on gateway calls in flight together
    pub max_in_flight: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl OrchestratorConfig {
    /// Fully sequential dispatch
    pub fn sequential() -> Self {
        Self {
            max_in_flight: 1,
            ..Self::default()
        }
    }

    pub fn validated(self) -> Result<Self> {
        if self.max_in_flight == 0 {
            return Err(Error::config("max_in_flight must be at least 1"));
        }
        Ok(Self {
            layout: self.layout.validated()?,
            ..self
        })
    }
}
