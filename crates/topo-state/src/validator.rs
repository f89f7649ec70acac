//! Pre-dispatch action validation
//!
//! Runs against the cache as it stands when the action's turn comes, so an
//! action may reference nodes confirmed earlier in the same batch.

use thiserror::Error;
use topo_core::{ActionBody, DeleteTarget, LinkKey, LinkSelector, NodeKind, TopologyState};

/// Why an action was refused before reaching the backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("link endpoints must differ (self-loop on '{0}')")]
    SelfLoop(String),

    #[error("node '{0}' does not exist")]
    UnknownNode(String),

    #[error("node '{0}' already exists")]
    DuplicateNode(String),

    #[error("node '{id}' is a {found}, expected a {expected}")]
    WrongKind {
        id: String,
        expected: NodeKind,
        found: NodeKind,
    },

    #[error("link '{0}' already exists")]
    DuplicateLink(String),

    #[error("link '{0}' does not exist")]
    UnknownLink(String),

    #[error("command for node '{0}' is empty")]
    EmptyCommand(String),
}

/// Check one action against the current topology
pub fn validate(action: &ActionBody, state: &TopologyState) -> Result<(), Rejection> {
    match action {
        ActionBody::CreateNode { node } => {
            if state.contains_node(&node.id) {
                return Err(Rejection::DuplicateNode(node.id.clone()));
            }
            // a switch may be created already attached to a controller
            match node.attribute("controller").and_then(|c| c.as_str()) {
                Some(controller) if node.kind == NodeKind::Switch => {
                    require_kind(state, controller, NodeKind::Controller)
                }
                _ => Ok(()),
            }
        }
        ActionBody::CreateLink { link } => {
            if link.src == link.dst {
                return Err(Rejection::SelfLoop(link.src.clone()));
            }
            require_node(state, &link.src)?;
            require_node(state, &link.dst)?;
            let key = LinkKey::new(link.src.clone(), link.dst.clone());
            if state.links.contains_key(&key) {
                return Err(Rejection::DuplicateLink(key.to_string()));
            }
            Ok(())
        }
        ActionBody::AssociateSwitch {
            switch_id,
            controller_id,
        } => {
            require_kind(state, switch_id, NodeKind::Switch)?;
            require_kind(state, controller_id, NodeKind::Controller)
        }
        ActionBody::RunCommand { command } => {
            require_node(state, &command.node_id)?;
            if command.command.trim().is_empty() {
                return Err(Rejection::EmptyCommand(command.node_id.clone()));
            }
            Ok(())
        }
        ActionBody::DeletePath { target } => match target {
            DeleteTarget::Node { node_id } => require_node(state, node_id),
            DeleteTarget::Link {
                link: LinkSelector::Endpoints { src, dst },
            } => {
                let key = LinkKey::new(src.clone(), dst.clone());
                if state.links.contains_key(&key) {
                    Ok(())
                } else {
                    Err(Rejection::UnknownLink(key.to_string()))
                }
            }
            DeleteTarget::Link {
                link: LinkSelector::Id(id),
            } => state
                .link_by_id(id)
                .map(|_| ())
                .ok_or_else(|| Rejection::UnknownLink(id.clone())),
        },
        ActionBody::MoveNode { node_id, .. } => require_node(state, node_id),
        ActionBody::QueryTopology
        | ActionBody::Pingall
        | ActionBody::StartNetwork
        | ActionBody::Export => Ok(()),
    }
}

fn require_node(state: &TopologyState, id: &str) -> Result<(), Rejection> {
    if state.contains_node(id) {
        Ok(())
    } else {
        Err(Rejection::UnknownNode(id.to_string()))
    }
}

fn require_kind(state: &TopologyState, id: &str, expected: NodeKind) -> Result<(), Rejection> {
    match state.kind_of(id) {
        None => Err(Rejection::UnknownNode(id.to_string())),
        Some(found) if found != expected => Err(Rejection::WrongKind {
            id: id.to_string(),
            expected,
            found,
        }),
        Some(_) => Ok(()),
    }
}
