//! Local mirror of confirmed backend topology
//!
//! The cache is only ever advanced by [`TopologyCache::apply`] with a
//! confirmed backend result, or replaced wholesale from a backend snapshot.
//! It is therefore always a subset of what the backend has confirmed.

use serde_json::{json, Value};
use topo_core::{
    ActionBody, BackendResult, DeleteTarget, Link, LinkKey, LinkSelector, Node, NodeKind,
    TopologyState,
};
use tracing::{debug, warn};

/// What an apply call changed
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// Result not confirmed, or action is read-only
    Unchanged,
    NodeAdded(Node),
    LinkAdded(Link),
    Associated { switch_id: String, controller_id: String },
    NodeRemoved {
        node_id: String,
        links_removed: usize,
        associations_removed: usize,
    },
    LinkRemoved(Link),
    NodeMoved(Node),
}

impl Applied {
    /// JSON summary returned to callers as the action result
    pub fn to_json(&self) -> Value {
        match self {
            Applied::Unchanged => Value::Null,
            Applied::NodeAdded(node) => json!({ "created": node }),
            Applied::LinkAdded(link) => json!({ "linked": link }),
            Applied::Associated {
                switch_id,
                controller_id,
            } => json!({ "switch": switch_id, "controller": controller_id }),
            Applied::NodeRemoved {
                node_id,
                links_removed,
                associations_removed,
            } => json!({
                "deleted": node_id,
                "links_removed": links_removed,
                "associations_removed": associations_removed,
            }),
            Applied::LinkRemoved(link) => json!({ "unlinked": link }),
            Applied::NodeMoved(node) => json!({ "moved": node }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TopologyCache {
    state: TopologyState,
    revision: u64,
}

impl TopologyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: TopologyState) -> Self {
        Self {
            state: snapshot,
            revision: 1,
        }
    }

    pub fn state(&self) -> &TopologyState {
        &self.state
    }

    pub fn snapshot(&self) -> TopologyState {
        self.state.clone()
    }

    /// Bumped on every mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Full-state overwrite from an authoritative backend snapshot
    pub fn replace(&mut self, snapshot: TopologyState) {
        debug!(
            nodes = snapshot.nodes.len(),
            links = snapshot.links.len(),
            "Replacing topology cache from snapshot"
        );
        self.state = snapshot;
        self.revision += 1;
    }

    /// Fold a backend result into the cache. Unconfirmed results never mutate.
    pub fn apply(&mut self, action: &ActionBody, result: &BackendResult) -> Applied {
        if !result.confirmation().is_confirmed() {
            return Applied::Unchanged;
        }

        let applied = match action {
            ActionBody::CreateNode { node } => {
                self.state.nodes.insert(node.id.clone(), node.clone());
                if node.kind == NodeKind::Switch {
                    if let Some(controller) = node.attribute("controller").and_then(Value::as_str) {
                        self.state
                            .associations
                            .insert(node.id.clone(), controller.to_string());
                    }
                }
                Applied::NodeAdded(node.clone())
            }
            ActionBody::CreateLink { link } => {
                let mut added = Link::new(link.src.clone(), link.dst.clone());
                added.options = link.options.clone();
                added.id = backend_link_id(&result.data);
                self.state.links.insert(added.key(), added.clone());
                Applied::LinkAdded(added)
            }
            ActionBody::AssociateSwitch {
                switch_id,
                controller_id,
            } => {
                self.state
                    .associations
                    .insert(switch_id.clone(), controller_id.clone());
                if let Some(switch) = self.state.nodes.get_mut(switch_id) {
                    switch
                        .attributes
                        .insert("controller".into(), json!(controller_id));
                }
                Applied::Associated {
                    switch_id: switch_id.clone(),
                    controller_id: controller_id.clone(),
                }
            }
            ActionBody::DeletePath {
                target: DeleteTarget::Node { node_id },
            } => self.remove_node(node_id),
            ActionBody::DeletePath {
                target: DeleteTarget::Link { link },
            } => self.remove_link(link),
            ActionBody::MoveNode { node_id, position } => match self.state.nodes.get_mut(node_id) {
                Some(node) => {
                    node.position = *position;
                    Applied::NodeMoved(node.clone())
                }
                None => {
                    warn!(node_id = %node_id, "Confirmed move for a node missing from the cache");
                    Applied::Unchanged
                }
            },
            ActionBody::RunCommand { .. }
            | ActionBody::QueryTopology
            | ActionBody::Pingall
            | ActionBody::StartNetwork
            | ActionBody::Export => Applied::Unchanged,
        };

        if applied != Applied::Unchanged {
            self.revision += 1;
        }
        applied
    }

    /// Remove a node with every link and association referencing it
    fn remove_node(&mut self, node_id: &str) -> Applied {
        if self.state.nodes.remove(node_id).is_none() {
            warn!(node_id = %node_id, "Confirmed delete for a node missing from the cache");
        }

        let before = self.state.links.len();
        self.state.links.retain(|key, _| !key.touches(node_id));
        let links_removed = before - self.state.links.len();

        let before = self.state.associations.len();
        self.state
            .associations
            .retain(|switch, controller| switch != node_id && controller != node_id);
        let associations_removed = before - self.state.associations.len();

        for node in self.state.nodes.values_mut() {
            if node.attribute("controller").and_then(Value::as_str) == Some(node_id) {
                node.attributes.insert("controller".into(), Value::Null);
            }
        }

        Applied::NodeRemoved {
            node_id: node_id.to_string(),
            links_removed,
            associations_removed,
        }
    }

    fn remove_link(&mut self, selector: &LinkSelector) -> Applied {
        let key = match selector {
            LinkSelector::Endpoints { src, dst } => Some(LinkKey::new(src.clone(), dst.clone())),
            LinkSelector::Id(id) => self.state.link_by_id(id).map(Link::key),
        };
        match key.and_then(|k| self.state.links.remove(&k)) {
            Some(link) => Applied::LinkRemoved(link),
            None => {
                warn!(?selector, "Confirmed link delete for a link missing from the cache");
                Applied::Unchanged
            }
        }
    }
}

/// Link id from a create-link response, when the backend assigns one
fn backend_link_id(data: &Value) -> Option<String> {
    ["id", "link_id"].iter().find_map(|field| match data.get(*field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_core::{LinkSpec, NodeKind, Position};

    fn ok() -> BackendResult {
        BackendResult::success(json!({"status": "ok"}))
    }

    fn create(cache: &mut TopologyCache, id: &str, kind: NodeKind) {
        let node = Node::new(id, kind, Position::default());
        cache.apply(&ActionBody::CreateNode { node }, &ok());
    }

    #[test]
    fn test_unconfirmed_results_never_mutate() {
        let mut cache = TopologyCache::new();
        let node = Node::new("h1", NodeKind::Host, Position::default());
        let action = ActionBody::CreateNode { node };

        let rejected = BackendResult::failure(Some(400), "duplicate");
        assert_eq!(cache.apply(&action, &rejected), Applied::Unchanged);

        let ambiguous = BackendResult::success(json!({"status": "queued"}));
        assert_eq!(cache.apply(&action, &ambiguous), Applied::Unchanged);

        assert!(cache.state().is_empty());
        assert_eq!(cache.revision(), 0);
    }

    #[test]
    fn test_link_picks_up_backend_id() {
        let mut cache = TopologyCache::new();
        create(&mut cache, "h1", NodeKind::Host);
        create(&mut cache, "s1", NodeKind::Switch);

        let action = ActionBody::CreateLink {
            link: LinkSpec::new("h1", "s1"),
        };
        let applied = cache.apply(&action, &BackendResult::success(json!({"link_id": 42})));
        let Applied::LinkAdded(link) = applied else {
            panic!("expected a link");
        };
        assert_eq!(link.id.as_deref(), Some("42"));
        assert!(cache.state().link_by_id("42").is_some());
    }

    #[test]
    fn test_node_delete_cascades() {
        let mut cache = TopologyCache::new();
        create(&mut cache, "h1", NodeKind::Host);
        create(&mut cache, "s1", NodeKind::Switch);
        create(&mut cache, "s2", NodeKind::Switch);
        create(&mut cache, "c1", NodeKind::Controller);
        for (src, dst) in [("h1", "s1"), ("s1", "s2")] {
            cache.apply(
                &ActionBody::CreateLink {
                    link: LinkSpec::new(src, dst),
                },
                &ok(),
            );
        }
        cache.apply(
            &ActionBody::AssociateSwitch {
                switch_id: "s1".into(),
                controller_id: "c1".into(),
            },
            &ok(),
        );

        let applied = cache.apply(
            &ActionBody::DeletePath {
                target: DeleteTarget::Node {
                    node_id: "s1".into(),
                },
            },
            &ok(),
        );

        assert_eq!(
            applied,
            Applied::NodeRemoved {
                node_id: "s1".into(),
                links_removed: 2,
                associations_removed: 1,
            }
        );
        assert!(cache.state().links.is_empty());
        assert!(cache.state().associations.is_empty());
        assert_eq!(cache.state().nodes.len(), 3);
    }

    #[test]
    fn test_controller_delete_clears_switch_attribute() {
        let mut cache = TopologyCache::new();
        create(&mut cache, "s1", NodeKind::Switch);
        create(&mut cache, "c1", NodeKind::Controller);
        cache.apply(
            &ActionBody::AssociateSwitch {
                switch_id: "s1".into(),
                controller_id: "c1".into(),
            },
            &ok(),
        );
        assert_eq!(
            cache.state().node("s1").unwrap().attribute("controller"),
            Some(&json!("c1"))
        );

        cache.apply(
            &ActionBody::DeletePath {
                target: DeleteTarget::Node {
                    node_id: "c1".into(),
                },
            },
            &ok(),
        );
        assert_eq!(
            cache.state().node("s1").unwrap().attribute("controller"),
            Some(&Value::Null)
        );
    }

    #[test]
    fn test_read_only_actions_keep_revision() {
        let mut cache = TopologyCache::new();
        create(&mut cache, "h1", NodeKind::Host);
        let revision = cache.revision();
        cache.apply(&ActionBody::QueryTopology, &ok());
        cache.apply(&ActionBody::Pingall, &ok());
        cache.apply(&ActionBody::StartNetwork, &ok());
        cache.apply(&ActionBody::Export, &BackendResult::success(json!({"script": "#!"})));
        assert_eq!(cache.revision(), revision);
    }

    #[test]
    fn test_move_updates_position() {
        let mut cache = TopologyCache::new();
        create(&mut cache, "h1", NodeKind::Host);

        let action = ActionBody::MoveNode {
            node_id: "h1".into(),
            position: Position::new(300.0, 120.0),
        };
        let unconfirmed = BackendResult::success(json!({"status": "pending"}));
        assert_eq!(cache.apply(&action, &unconfirmed), Applied::Unchanged);
        assert_eq!(cache.state().node("h1").unwrap().position, Position::default());

        let applied = cache.apply(&action, &ok());
        assert_eq!(applied.to_json()["moved"]["position"], json!({"x": 300.0, "y": 120.0}));
        assert_eq!(
            cache.state().node("h1").unwrap().position,
            Position::new(300.0, 120.0)
        );
    }

    #[test]
    fn test_switch_created_with_controller_is_associated() {
        let mut cache = TopologyCache::new();
        create(&mut cache, "c1", NodeKind::Controller);
        let switch = Node::new("s1", NodeKind::Switch, Position::default())
            .with_attribute("controller", json!("c1"));
        cache.apply(&ActionBody::CreateNode { node: switch }, &ok());

        assert_eq!(cache.state().associations.get("s1").map(String::as_str), Some("c1"));
    }
}
