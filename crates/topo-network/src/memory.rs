//! In-memory backend
//!
//! Holds its own topology and answers like the Mininet backend would, with
//! failures injectable per call number or per node. Used by tests and the
//! service's `--dry-run` mode.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

use topo_core::{ActionBody, BackendResult, Footprint, NodeKind, TopologyState};
use topo_state::{validate, Rejection, TopologyCache};

use crate::error::GatewayError;
use crate::gateway::BackendGateway;

/// A scripted failure
#[derive(Debug, Clone, PartialEq)]
pub enum InjectedFailure {
    /// Backend answers with an error status and this detail
    Refuse(String),
    /// Backend applies the action but answers without confirming it
    Ambiguous,
    /// No answer at all
    Unreachable,
}

#[derive(Default)]
struct Inner {
    topology: TopologyCache,
    by_call: HashMap<usize, InjectedFailure>,
    by_node: HashMap<String, InjectedFailure>,
    next_link_id: u64,
    started: bool,
    received: Vec<ActionBody>,
}

#[derive(Default)]
pub struct InMemoryBackend {
    inner: Mutex<Inner>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing topology
    pub fn with_topology(topology: TopologyState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                topology: TopologyCache::from_snapshot(topology),
                ..Inner::default()
            }),
            ..Self::default()
        }
    }

    /// Make the `n`th `execute` call (1-based) fail
    pub async fn fail_call(&self, n: usize, failure: InjectedFailure) {
        self.inner.lock().await.by_call.insert(n, failure);
    }

    /// Make every action touching `node_id` fail
    pub async fn fail_node(&self, node_id: &str, failure: InjectedFailure) {
        self.inner
            .lock()
            .await
            .by_node
            .insert(node_id.to_string(), failure);
    }

    pub async fn clear_failures(&self) {
        let mut inner = self.inner.lock().await;
        inner.by_call.clear();
        inner.by_node.clear();
    }

    /// Number of `execute` calls received
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of `execute` calls observed in flight together
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Action names in the order they were received
    pub async fn call_log(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .received
            .iter()
            .map(|action| action.name().to_string())
            .collect()
    }

    /// Actions exactly as they arrived over the gateway
    pub async fn received(&self) -> Vec<ActionBody> {
        self.inner.lock().await.received.clone()
    }

    pub async fn topology(&self) -> TopologyState {
        self.inner.lock().await.topology.snapshot()
    }

    async fn answer(&self, call: usize, action: &ActionBody) -> Result<BackendResult, GatewayError> {
        let mut inner = self.inner.lock().await;
        inner.received.push(action.clone());

        let injected = inner.by_call.get(&call).cloned().or_else(|| match action.footprint() {
            Footprint::Nodes(ids) => ids.iter().find_map(|id| inner.by_node.get(id).cloned()),
            Footprint::Global => None,
        });
        match &injected {
            Some(InjectedFailure::Refuse(detail)) => {
                return Ok(BackendResult::failure(Some(500), detail.clone()))
            }
            Some(InjectedFailure::Unreachable) => {
                return Err(GatewayError::Transport {
                    url: format!("memory://{}", action.name()),
                    message: "connection refused".to_string(),
                })
            }
            Some(InjectedFailure::Ambiguous) | None => {}
        }

        if let Err(rejection) = validate(action, inner.topology.state()) {
            let status = match &rejection {
                Rejection::UnknownNode(_) | Rejection::UnknownLink(_) => 404,
                _ => 400,
            };
            return Ok(BackendResult::failure(Some(status), rejection.to_string()));
        }

        let data = match action {
            ActionBody::CreateLink { .. } => {
                inner.next_link_id += 1;
                json!({ "status": "ok", "id": inner.next_link_id.to_string() })
            }
            ActionBody::RunCommand { command } => json!({
                "status": "ok",
                "output": format!("{}> {}", command.node_id, command.command),
            }),
            ActionBody::Pingall => {
                let hosts = inner
                    .topology
                    .state()
                    .nodes
                    .values()
                    .filter(|n| n.kind == NodeKind::Host)
                    .count();
                json!({ "status": "ok", "hosts": hosts, "dropped": 0 })
            }
            ActionBody::StartNetwork if inner.started => {
                return Ok(BackendResult::failure(Some(400), "network already started"));
            }
            ActionBody::StartNetwork => {
                inner.started = true;
                json!({ "status": "ok" })
            }
            ActionBody::Export => json!({ "script": export_script(inner.topology.state()) }),
            ActionBody::QueryTopology => serde_json::to_value(inner.topology.state())
                .map_err(|e| GatewayError::Decode(e.to_string()))?,
            ActionBody::DeletePath { .. }
            | ActionBody::CreateNode { .. }
            | ActionBody::AssociateSwitch { .. }
            | ActionBody::MoveNode { .. } => json!({ "status": "ok" }),
        };

        let result = BackendResult::success(data);
        inner.topology.apply(action, &result);

        // applied here, but the answer does not say so
        if injected == Some(InjectedFailure::Ambiguous) {
            return Ok(BackendResult::success(json!({ "status": "pending" })));
        }
        Ok(result)
    }
}

/// Standalone Mininet script rebuilding `state`
fn export_script(state: &TopologyState) -> String {
    let mut script = String::from(
        "#!/usr/bin/env python3\n\nfrom mininet.net import Mininet\nfrom mininet.cli import CLI\n\nnet = Mininet()\n\n",
    );
    for node in state.nodes.values() {
        let call = match node.kind {
            NodeKind::Host | NodeKind::Router => "addHost",
            NodeKind::Switch => "addSwitch",
            NodeKind::Controller => "addController",
            NodeKind::Nat => "addNAT",
        };
        let _ = write!(script, "{} = net.{}('{}'", node.id, call, node.id);
        if let Some(Value::String(ip)) = node.attribute("ip") {
            let _ = write!(script, ", ip='{}'", ip);
        }
        script.push_str(")\n");
    }
    script.push('\n');
    for link in state.links.values() {
        let _ = writeln!(script, "net.addLink({}, {})", link.src, link.dst);
    }
    script.push_str("\nnet.start()\nCLI(net)\nnet.stop()\n");
    script
}

#[async_trait]
impl BackendGateway for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn execute(&self, action: &ActionBody) -> Result<BackendResult, GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        // let sibling calls of the same wave start before this one answers
        tokio::task::yield_now().await;

        let result = self.answer(call, action).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        debug!(
            call,
            action = action.name(),
            ok = ?result.as_ref().map(|r| r.ok),
            "Memory backend answered"
        );
        result
    }

    async fn fetch_snapshot(&self) -> Result<TopologyState, GatewayError> {
        Ok(self.topology().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_core::{LinkSpec, Node, Position};

    fn host(id: &str) -> ActionBody {
        ActionBody::CreateNode {
            node: Node::new(id, NodeKind::Host, Position::default()),
        }
    }

    #[tokio::test]
    async fn test_memory_backend_mirrors_mutations() {
        let backend = InMemoryBackend::new();
        assert!(backend.execute(&host("h1")).await.unwrap().ok);
        assert!(backend.execute(&host("h2")).await.unwrap().ok);

        let link = ActionBody::CreateLink {
            link: LinkSpec::new("h1", "h2"),
        };
        let result = backend.execute(&link).await.unwrap();
        assert_eq!(result.data["id"], "1");

        let topology = backend.fetch_snapshot().await.unwrap();
        assert_eq!(topology.nodes.len(), 2);
        assert_eq!(topology.links.len(), 1);
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_backend_side_refusals() {
        let backend = InMemoryBackend::new();
        backend.execute(&host("h1")).await.unwrap();
        let again = backend.execute(&host("h1")).await.unwrap();
        assert!(!again.ok);
        assert_eq!(again.status, Some(400));

        let dangling = ActionBody::CreateLink {
            link: LinkSpec::new("h1", "s9"),
        };
        let result = backend.execute(&dangling).await.unwrap();
        assert_eq!(result.status, Some(404));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let backend = InMemoryBackend::new();
        backend
            .fail_call(2, InjectedFailure::Refuse("boom".into()))
            .await;
        backend.fail_node("h3", InjectedFailure::Unreachable).await;

        assert!(backend.execute(&host("h1")).await.unwrap().ok);
        let refused = backend.execute(&host("h2")).await.unwrap();
        assert_eq!(refused.detail.as_deref(), Some("boom"));
        assert!(backend.execute(&host("h3")).await.is_err());

        let topology = backend.topology().await;
        assert!(topology.contains_node("h1"));
        assert!(!topology.contains_node("h2"));
        assert!(!topology.contains_node("h3"));
    }

    #[tokio::test]
    async fn test_network_starts_once() {
        let backend = InMemoryBackend::new();
        assert!(backend.execute(&ActionBody::StartNetwork).await.unwrap().ok);

        let again = backend.execute(&ActionBody::StartNetwork).await.unwrap();
        assert!(!again.ok);
        assert_eq!(again.status, Some(400));
        assert_eq!(again.detail.as_deref(), Some("network already started"));
    }

    #[tokio::test]
    async fn test_move_and_export() {
        let backend = InMemoryBackend::new();
        backend.execute(&host("h1")).await.unwrap();
        backend
            .execute(&ActionBody::CreateNode {
                node: Node::new("s1", NodeKind::Switch, Position::default()),
            })
            .await
            .unwrap();
        backend
            .execute(&ActionBody::CreateLink {
                link: LinkSpec::new("h1", "s1"),
            })
            .await
            .unwrap();

        let moved = ActionBody::MoveNode {
            node_id: "h1".into(),
            position: Position::new(250.0, 50.0),
        };
        assert!(backend.execute(&moved).await.unwrap().ok);
        assert_eq!(
            backend.topology().await.node("h1").unwrap().position,
            Position::new(250.0, 50.0)
        );

        let missing = ActionBody::MoveNode {
            node_id: "h9".into(),
            position: Position::default(),
        };
        assert_eq!(backend.execute(&missing).await.unwrap().status, Some(404));

        let export = backend.execute(&ActionBody::Export).await.unwrap();
        let script = export.data["script"].as_str().unwrap();
        assert!(script.contains("h1 = net.addHost('h1')"));
        assert!(script.contains("s1 = net.addSwitch('s1')"));
        assert!(script.contains("net.addLink(h1, s1)"));
    }
}
