//! Common types used across the topology orchestrator

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::Error;

/// Node identifier (`h1`, `s2`, `c1`, ...)
pub type NodeId = String;

/// Kind of a topology node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Host,
    Switch,
    Controller,
    Nat,
    Router,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Host,
        NodeKind::Switch,
        NodeKind::Controller,
        NodeKind::Nat,
        NodeKind::Router,
    ];

    /// Wire name used by the backend `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Host => "host",
            NodeKind::Switch => "switch",
            NodeKind::Controller => "controller",
            NodeKind::Nat => "nat",
            NodeKind::Router => "router",
        }
    }

    /// Id namespace prefix
    pub fn prefix(&self) -> &'static str {
        match self {
            NodeKind::Host => "h",
            NodeKind::Switch => "s",
            NodeKind::Controller => "c",
            NodeKind::Nat => "nat",
            NodeKind::Router => "r",
        }
    }

    /// Backend collection segment (`/api/mininet/<collection>`)
    pub fn collection(&self) -> &'static str {
        match self {
            NodeKind::Host => "hosts",
            NodeKind::Switch => "switches",
            NodeKind::Controller => "controllers",
            NodeKind::Nat => "nats",
            NodeKind::Router => "routers",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let name = lowered.strip_suffix("node").unwrap_or(&lowered);
        match name {
            "host" => Ok(NodeKind::Host),
            "switch" => Ok(NodeKind::Switch),
            "controller" => Ok(NodeKind::Controller),
            "nat" => Ok(NodeKind::Nat),
            "router" => Ok(NodeKind::Router),
            _ => Err(Error::invalid_argument(format!("unknown node kind '{}'", s))),
        }
    }
}

/// Canvas position of a node
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Bit-exact key, usable in hash sets
    pub fn key(&self) -> (u64, u64) {
        (self.x.to_bits(), self.y.to_bits())
    }
}

/// A node in the topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub position: Position,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, position: Position) -> Self {
        Self {
            id: id.into(),
            kind,
            position,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Ordered endpoint pair identifying a link when the backend assigns no id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkKey {
    pub src: NodeId,
    pub dst: NodeId,
}

impl LinkKey {
    pub fn new(src: impl Into<NodeId>, dst: impl Into<NodeId>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.src == node_id || self.dst == node_id
    }
}

impl std::fmt::Display for LinkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.src, self.dst)
    }
}

/// A link between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub src: NodeId,
    pub dst: NodeId,
    /// Backend-assigned id; authoritative for deletion when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

impl Link {
    pub fn new(src: impl Into<NodeId>, dst: impl Into<NodeId>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            id: None,
            options: None,
        }
    }

    pub fn key(&self) -> LinkKey {
        LinkKey::new(self.src.clone(), self.dst.clone())
    }
}

/// The local mirror of confirmed backend topology
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopologyState {
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, Node>,
    #[serde(default, with = "link_list")]
    pub links: BTreeMap<LinkKey, Link>,
    /// switch id -> controller id
    #[serde(default)]
    pub associations: BTreeMap<NodeId, NodeId>,
}

impl TopologyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn kind_of(&self, id: &str) -> Option<NodeKind> {
        self.nodes.get(id).map(|n| n.kind)
    }

    pub fn link_by_id(&self, id: &str) -> Option<&Link> {
        self.links
            .values()
            .find(|l| l.id.as_deref() == Some(id) || l.key().to_string() == id)
    }

    pub fn links_touching<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.values().filter(move |l| l.key().touches(node_id))
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.nodes.values().map(|n| n.position)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty() && self.associations.is_empty()
    }
}

/// Serializes the link map as a plain JSON array
mod link_list {
    use super::{Link, LinkKey};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        links: &BTreeMap<LinkKey, Link>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(links.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<LinkKey, Link>, D::Error> {
        let links = Vec::<Link>::deserialize(deserializer)?;
        Ok(links.into_iter().map(|l| (l.key(), l)).collect())
    }
}
