//! Requests, atomic actions and their footprints
//!
//! A [`Request`] is what a caller submits; batch-style requests
//! ([`RequestBody::CreateNodes`]) expand into one [`Action`] per node before
//! dispatch. Every action carries its own correlation id.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::types::{Node, NodeId, NodeKind, Position};

/// One node of a batch creation, before id/position allocation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl NodeDraft {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            position: Some(Position::new(x, y)),
            attributes: Map::new(),
        }
    }
}

/// "Create N nodes of one kind"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeBatch {
    pub kind: NodeKind,
    pub members: Vec<NodeDraft>,
    /// Where derived positions start when members carry none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Position>,
}

impl NodeBatch {
    pub fn new(kind: NodeKind, members: Vec<NodeDraft>) -> Self {
        Self {
            kind,
            members,
            anchor: None,
        }
    }

    /// `count` members with derived positions
    pub fn unplaced(kind: NodeKind, count: usize) -> Self {
        Self::new(kind, vec![NodeDraft::default(); count])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub src: NodeId,
    pub dst: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

impl LinkSpec {
    pub fn new(src: impl Into<NodeId>, dst: impl Into<NodeId>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            options: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub node_id: NodeId,
    pub command: String,
}

/// How a link is addressed for deletion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSelector {
    Endpoints { src: NodeId, dst: NodeId },
    Id(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum DeleteTarget {
    Node { node_id: NodeId },
    Link { link: LinkSelector },
}

/// Atomic action body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionBody {
    CreateNode { node: Node },
    CreateLink { link: LinkSpec },
    AssociateSwitch {
        switch_id: NodeId,
        controller_id: NodeId,
    },
    RunCommand { command: CommandSpec },
    DeletePath { target: DeleteTarget },
    MoveNode {
        node_id: NodeId,
        position: Position,
    },
    QueryTopology,
    Pingall,
    StartNetwork,
    /// Runnable script of the backend topology
    Export,
}

impl ActionBody {
    /// Short action name for logs and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            ActionBody::CreateNode { .. } => "create_node",
            ActionBody::CreateLink { .. } => "create_link",
            ActionBody::AssociateSwitch { .. } => "associate_switch",
            ActionBody::RunCommand { .. } => "run_command",
            ActionBody::DeletePath { .. } => "delete_path",
            ActionBody::MoveNode { .. } => "move_node",
            ActionBody::QueryTopology => "query_topology",
            ActionBody::Pingall => "pingall",
            ActionBody::StartNetwork => "start_network",
            ActionBody::Export => "export",
        }
    }

    /// Whether a confirmed result advances the state cache
    pub fn changes_topology(&self) -> bool {
        matches!(
            self,
            ActionBody::CreateNode { .. }
                | ActionBody::CreateLink { .. }
                | ActionBody::AssociateSwitch { .. }
                | ActionBody::DeletePath { .. }
                | ActionBody::MoveNode { .. }
        )
    }

    /// Entities this action touches. Overlapping footprints are never in flight together.
    pub fn footprint(&self) -> Footprint {
        match self {
            ActionBody::CreateNode { node } => Footprint::nodes([node.id.clone()]),
            ActionBody::CreateLink { link } => {
                Footprint::nodes([link.src.clone(), link.dst.clone()])
            }
            ActionBody::AssociateSwitch {
                switch_id,
                controller_id,
            } => Footprint::nodes([switch_id.clone(), controller_id.clone()]),
            ActionBody::RunCommand { command } => Footprint::nodes([command.node_id.clone()]),
            ActionBody::DeletePath {
                target: DeleteTarget::Node { node_id },
            } => Footprint::nodes([node_id.clone()]),
            ActionBody::DeletePath {
                target:
                    DeleteTarget::Link {
                        link: LinkSelector::Endpoints { src, dst },
                    },
            } => Footprint::nodes([src.clone(), dst.clone()]),
            // endpoints unknown until resolved against the cache
            ActionBody::DeletePath {
                target:
                    DeleteTarget::Link {
                        link: LinkSelector::Id(_),
                    },
            } => Footprint::Global,
            ActionBody::MoveNode { node_id, .. } => Footprint::nodes([node_id.clone()]),
            ActionBody::QueryTopology
            | ActionBody::Pingall
            | ActionBody::StartNetwork
            | ActionBody::Export => Footprint::Global,
        }
    }
}

/// Set of node ids an action reads or writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Footprint {
    Nodes(BTreeSet<NodeId>),
    /// Depends on the whole topology
    Global,
}

impl Footprint {
    pub fn nodes<I: IntoIterator<Item = NodeId>>(ids: I) -> Self {
        Footprint::Nodes(ids.into_iter().collect())
    }

    pub fn overlaps(&self, other: &Footprint) -> bool {
        match (self, other) {
            (Footprint::Global, _) | (_, Footprint::Global) => true,
            (Footprint::Nodes(a), Footprint::Nodes(b)) => !a.is_disjoint(b),
        }
    }
}

/// An atomic action with its correlation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub correlation_id: String,
    #[serde(flatten)]
    pub body: ActionBody,
}

impl Action {
    pub fn new(correlation_id: impl Into<String>, body: ActionBody) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            body,
        }
    }
}

/// What a caller submits before expansion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestBody {
    CreateNodes(NodeBatch),
    Action(ActionBody),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub correlation_id: String,
    pub body: RequestBody,
}

impl Request {
    pub fn new(correlation_id: impl Into<String>, body: RequestBody) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            body,
        }
    }

    /// Request with a generated correlation id
    pub fn anonymous(body: RequestBody) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), body)
    }

    pub fn create_nodes(correlation_id: impl Into<String>, batch: NodeBatch) -> Self {
        Self::new(correlation_id, RequestBody::CreateNodes(batch))
    }

    pub fn action(correlation_id: impl Into<String>, body: ActionBody) -> Self {
        Self::new(correlation_id, RequestBody::Action(body))
    }

    pub fn create_link(correlation_id: impl Into<String>, src: &str, dst: &str) -> Self {
        Self::action(
            correlation_id,
            ActionBody::CreateLink {
                link: LinkSpec::new(src, dst),
            },
        )
    }

    pub fn delete_node(correlation_id: impl Into<String>, node_id: &str) -> Self {
        Self::action(
            correlation_id,
            ActionBody::DeletePath {
                target: DeleteTarget::Node {
                    node_id: node_id.to_string(),
                },
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footprint_overlap() {
        let a = Footprint::nodes(["h1".to_string(), "s1".to_string()]);
        let b = Footprint::nodes(["s1".to_string()]);
        let c = Footprint::nodes(["h2".to_string()]);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(Footprint::Global.overlaps(&c));
    }

    #[test]
    fn test_delete_by_link_id_is_global() {
        let body = ActionBody::DeletePath {
            target: DeleteTarget::Link {
                link: LinkSelector::Id("L1".into()),
            },
        };
        assert_eq!(body.footprint(), Footprint::Global);
        assert!(body.changes_topology());
    }

    #[test]
    fn test_network_wide_actions() {
        for body in [ActionBody::StartNetwork, ActionBody::Export, ActionBody::Pingall] {
            assert_eq!(body.footprint(), Footprint::Global);
            assert!(!body.changes_topology());
        }

        let moved = ActionBody::MoveNode {
            node_id: "h1".into(),
            position: Position::new(10.0, 20.0),
        };
        assert_eq!(moved.footprint(), Footprint::nodes(["h1".to_string()]));
        assert!(moved.changes_topology());
        assert_eq!(serde_json::to_value(&moved).unwrap()["action"], "move_node");
    }

    #[test]
    fn test_action_serialization_is_tagged() {
        let action = Action::new(
            "call_1",
            ActionBody::CreateLink {
                link: LinkSpec::new("h1", "s1"),
            },
        );
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["action"], "create_link");
        assert_eq!(value["correlation_id"], "call_1");
        assert_eq!(value["link"]["src"], "h1");
    }
}
