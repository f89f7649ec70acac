use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Action metrics collector
///
/// Counters are labelled by action name only; the action set is closed, so
/// cardinality stays bounded.
#[derive(Clone)]
pub struct ActionMetrics {
    actions_started: IntCounterVec,

    active_actions: IntGauge,

    actions_succeeded: IntCounterVec,

    actions_failed: IntCounterVec,

    /// Refused before reaching the backend
    actions_rejected: IntCounterVec,

    action_duration: Histogram,

    registry: Registry,
}

impl ActionMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let actions_started = IntCounterVec::new(
            Opts::new(
                "topo_actions_started_total",
                "Total number of actions accepted for dispatch",
            ),
            &["action"],
        )?;
        registry.register(Box::new(actions_started.clone()))?;

        let active_actions = IntGauge::new(
            "topo_active_actions",
            "Number of actions not yet at a terminal outcome",
        )?;
        registry.register(Box::new(active_actions.clone()))?;

        let actions_succeeded = IntCounterVec::new(
            Opts::new(
                "topo_actions_succeeded_total",
                "Total number of actions confirmed by the backend",
            ),
            &["action"],
        )?;
        registry.register(Box::new(actions_succeeded.clone()))?;

        let actions_failed = IntCounterVec::new(
            Opts::new(
                "topo_actions_failed_total",
                "Total number of actions that failed at or after the gateway",
            ),
            &["action"],
        )?;
        registry.register(Box::new(actions_failed.clone()))?;

        let actions_rejected = IntCounterVec::new(
            Opts::new(
                "topo_actions_rejected_total",
                "Total number of actions rejected by validation",
            ),
            &["action"],
        )?;
        registry.register(Box::new(actions_rejected.clone()))?;

        let action_duration = Histogram::with_opts(
            HistogramOpts::new(
                "topo_action_duration_seconds",
                "Action duration from acceptance to terminal outcome",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(action_duration.clone()))?;

        Ok(Self {
            actions_started,
            active_actions,
            actions_succeeded,
            actions_failed,
            actions_rejected,
            action_duration,
            registry,
        })
    }

    pub fn action_started(&self, action: &str) {
        self.actions_started.with_label_values(&[action]).inc();
        self.active_actions.inc();
    }

    pub fn action_succeeded(&self, action: &str, duration_ms: u64) {
        self.actions_succeeded.with_label_values(&[action]).inc();
        self.action_duration.observe(duration_ms as f64 / 1000.0);
        self.active_actions.dec();
    }

    pub fn action_failed(&self, action: &str, duration_ms: u64) {
        self.actions_failed.with_label_values(&[action]).inc();
        self.action_duration.observe(duration_ms as f64 / 1000.0);
        self.active_actions.dec();
    }

    pub fn action_rejected(&self, action: &str) {
        self.actions_rejected.with_label_values(&[action]).inc();
        self.active_actions.dec();
    }

    pub fn started_count(&self, action: &str) -> u64 {
        self.actions_started.with_label_values(&[action]).get()
    }

    pub fn succeeded_count(&self, action: &str) -> u64 {
        self.actions_succeeded.with_label_values(&[action]).get()
    }

    pub fn failed_count(&self, action: &str) -> u64 {
        self.actions_failed.with_label_values(&[action]).get()
    }

    pub fn rejected_count(&self, action: &str) -> u64 {
        self.actions_rejected.with_label_values(&[action]).get()
    }

    pub fn active(&self) -> i64 {
        self.active_actions.get()
    }

    /// Get metrics registry for scraping
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition format
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Get metrics as JSON (names and series counts)
    pub fn metrics_json(&self) -> serde_json::Value {
        let metrics: Vec<_> = self
            .registry
            .gather()
            .iter()
            .map(|family| {
                serde_json::json!({
                    "name": family.get_name(),
                    "help": family.get_help(),
                    "metric_count": family.get_metric().len(),
                })
            })
            .collect();

        serde_json::json!({ "metrics": metrics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_by_action() {
        let metrics = ActionMetrics::new().unwrap();
        metrics.action_started("create_node");
        metrics.action_started("create_node");
        metrics.action_started("create_link");
        metrics.action_succeeded("create_node", 12);
        metrics.action_failed("create_node", 40);
        metrics.action_rejected("create_link");

        assert_eq!(metrics.started_count("create_node"), 2);
        assert_eq!(metrics.succeeded_count("create_node"), 1);
        assert_eq!(metrics.failed_count("create_node"), 1);
        assert_eq!(metrics.rejected_count("create_link"), 1);
        assert_eq!(metrics.active(), 0);
    }

    #[test]
    fn test_text_exposition() {
        let metrics = ActionMetrics::new().unwrap();
        metrics.action_started("pingall");
        let text = metrics.gather_text().unwrap();
        assert!(text.contains("topo_actions_started_total{action=\"pingall\"} 1"));
        assert!(text.contains("topo_action_duration_seconds"));
    }
}
