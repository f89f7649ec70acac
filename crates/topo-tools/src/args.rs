//! Typed tool arguments and their translation into orchestrator requests
//!
//! Argument objects are untrusted. Anything that does not deserialize into the
//! tool's argument struct, names an unknown node kind, or carries an attribute
//! the node kind does not have, is an [`ArgsError`] and never reaches the
//! orchestrator.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use topo_core::{
    ActionBody, CommandSpec, DeleteTarget, LinkSelector, LinkSpec, NodeBatch, NodeDraft, NodeKind,
    Position, RequestBody,
};

use crate::tool::ToolName;

/// Upper bound on nodes created by one tool call
pub const MAX_BATCH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
enum AttributeType {
    Text,
    Flag,
    Port,
}

/// Attributes a caller may set per node kind. Everything else the backend
/// derives itself, or is set through a dedicated tool (`associate_switch`).
fn settable_attributes(kind: NodeKind) -> &'static [(&'static str, AttributeType)] {
    match kind {
        NodeKind::Host => &[("ip", AttributeType::Text), ("mac", AttributeType::Text)],
        NodeKind::Controller => &[
            ("remote", AttributeType::Flag),
            ("ip", AttributeType::Text),
            ("port", AttributeType::Port),
        ],
        NodeKind::Switch | NodeKind::Nat | NodeKind::Router => &[],
    }
}

#[derive(Error, Debug)]
pub enum ArgsError {
    #[error("Invalid arguments for {tool}: {source}")]
    Schema {
        tool: ToolName,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid arguments for {tool}: {message}")]
    Invalid { tool: ToolName, message: String },
}

impl ArgsError {
    fn invalid(tool: ToolName, message: impl Into<String>) -> Self {
        ArgsError::Invalid {
            tool,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NodeArg {
    x: Option<f64>,
    y: Option<f64>,
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CreateNodesArgs {
    kind: Option<String>,
    x: Option<f64>,
    y: Option<f64>,
    count: Option<usize>,
    nodes: Option<Vec<NodeArg>>,
    /// Remaining keys, checked against [`settable_attributes`]
    #[serde(flatten)]
    attributes: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateLinkArgs {
    #[serde(alias = "src", alias = "source")]
    from: String,
    #[serde(alias = "dst", alias = "target")]
    to: String,
    options: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AssociateArgs {
    #[serde(alias = "switch")]
    switch_id: String,
    #[serde(alias = "controller")]
    controller_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunCommandArgs {
    node_id: String,
    command: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteNodeArgs {
    #[serde(alias = "id")]
    node_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteLinkArgs {
    #[serde(alias = "id")]
    link_id: Option<String>,
    #[serde(alias = "src")]
    from: Option<String>,
    #[serde(alias = "dst")]
    to: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MoveNodeArgs {
    #[serde(alias = "id")]
    node_id: String,
    x: f64,
    y: f64,
}

fn parse<T: DeserializeOwned>(tool: ToolName, args: Value) -> Result<T, ArgsError> {
    serde_json::from_value(args).map_err(|source| ArgsError::Schema { tool, source })
}

/// Map one tool's arguments onto a request body
pub fn translate(tool: ToolName, args: Value) -> Result<RequestBody, ArgsError> {
    // `null` and `{}` both mean "no arguments"
    let args = if args.is_null() {
        Value::Object(Map::new())
    } else {
        args
    };

    let body = match tool {
        ToolName::CreateHost | ToolName::CreateSwitch | ToolName::CreateController => {
            let kind = match tool {
                ToolName::CreateHost => NodeKind::Host,
                ToolName::CreateSwitch => NodeKind::Switch,
                _ => NodeKind::Controller,
            };
            let parsed: CreateNodesArgs = parse(tool, args)?;
            if parsed.kind.is_some() {
                return Err(ArgsError::invalid(
                    tool,
                    format!("unknown field `kind`, {} creates {}s", tool, kind),
                ));
            }
            return create_nodes(tool, kind, parsed);
        }
        ToolName::CreateNode => {
            let parsed: CreateNodesArgs = parse(tool, args)?;
            let Some(kind) = parsed.kind.as_deref() else {
                return Err(ArgsError::invalid(tool, "missing field `kind`"));
            };
            let kind: NodeKind = kind
                .parse()
                .map_err(|e: topo_core::Error| ArgsError::invalid(tool, e.to_string()))?;
            return create_nodes(tool, kind, parsed);
        }
        ToolName::CreateLink => {
            let parsed: CreateLinkArgs = parse(tool, args)?;
            ActionBody::CreateLink {
                link: LinkSpec {
                    src: parsed.from,
                    dst: parsed.to,
                    options: parsed.options,
                },
            }
        }
        ToolName::AssociateSwitch => {
            let parsed: AssociateArgs = parse(tool, args)?;
            ActionBody::AssociateSwitch {
                switch_id: parsed.switch_id,
                controller_id: parsed.controller_id,
            }
        }
        ToolName::RunCommand => {
            let parsed: RunCommandArgs = parse(tool, args)?;
            ActionBody::RunCommand {
                command: CommandSpec {
                    node_id: parsed.node_id,
                    command: parsed.command,
                },
            }
        }
        ToolName::RunPingall => ActionBody::Pingall,
        ToolName::DeleteNode => {
            let parsed: DeleteNodeArgs = parse(tool, args)?;
            ActionBody::DeletePath {
                target: DeleteTarget::Node {
                    node_id: parsed.node_id,
                },
            }
        }
        ToolName::DeleteLink => {
            let parsed: DeleteLinkArgs = parse(tool, args)?;
            let link = match (parsed.link_id, parsed.from, parsed.to) {
                (Some(id), _, _) => LinkSelector::Id(id),
                (None, Some(src), Some(dst)) => LinkSelector::Endpoints { src, dst },
                _ => {
                    return Err(ArgsError::invalid(
                        tool,
                        "either link_id or both from and to are required",
                    ))
                }
            };
            ActionBody::DeletePath {
                target: DeleteTarget::Link { link },
            }
        }
        ToolName::MoveNode => {
            let parsed: MoveNodeArgs = parse(tool, args)?;
            if !(parsed.x.is_finite() && parsed.y.is_finite()) {
                return Err(ArgsError::invalid(tool, "x and y must be finite numbers"));
            }
            ActionBody::MoveNode {
                node_id: parsed.node_id,
                position: Position::new(parsed.x, parsed.y),
            }
        }
        ToolName::StartNetwork => ActionBody::StartNetwork,
        ToolName::ExportTopology => ActionBody::Export,
        ToolName::GetTopology => ActionBody::QueryTopology,
    };

    Ok(RequestBody::Action(body))
}

/// Keep the attributes `kind` allows, rejecting unknown or mistyped ones.
/// `null` means "use the default" and is dropped.
fn checked_attributes(
    tool: ToolName,
    kind: NodeKind,
    attributes: Map<String, Value>,
) -> Result<Map<String, Value>, ArgsError> {
    let allowed = settable_attributes(kind);
    let mut checked = Map::new();
    for (key, value) in attributes {
        let Some((_, expected)) = allowed.iter().find(|(name, _)| *name == key) else {
            return Err(ArgsError::invalid(
                tool,
                format!("unknown field `{}` for a {}", key, kind),
            ));
        };
        let fits = match (expected, &value) {
            (_, Value::Null) => continue,
            (AttributeType::Text, Value::String(_)) => true,
            (AttributeType::Flag, Value::Bool(_)) => true,
            (AttributeType::Port, Value::Number(n)) => {
                n.as_u64().map_or(false, |port| (1..=65535).contains(&port))
            }
            _ => false,
        };
        if !fits {
            return Err(ArgsError::invalid(
                tool,
                format!("invalid value for `{}`: {}", key, value),
            ));
        }
        checked.insert(key, value);
    }
    Ok(checked)
}

fn create_nodes(
    tool: ToolName,
    kind: NodeKind,
    mut args: CreateNodesArgs,
) -> Result<RequestBody, ArgsError> {
    args.attributes = checked_attributes(tool, kind, args.attributes)?;
    let explicit = match (args.x, args.y) {
        (Some(x), Some(y)) => Some(Position::new(x, y)),
        _ => None,
    };

    let batch = match (args.nodes, args.count) {
        (Some(nodes), _) if !nodes.is_empty() => {
            if nodes.len() > MAX_BATCH {
                return Err(ArgsError::invalid(
                    tool,
                    format!("at most {} nodes per call", MAX_BATCH),
                ));
            }
            let members = nodes
                .into_iter()
                .map(|node| {
                    let mut attributes = args.attributes.clone();
                    attributes.extend(checked_attributes(tool, kind, node.attributes)?);
                    Ok(NodeDraft {
                        position: match (node.x, node.y) {
                            (Some(x), Some(y)) => Some(Position::new(x, y)),
                            _ => None,
                        },
                        attributes,
                    })
                })
                .collect::<Result<Vec<_>, ArgsError>>()?;
            NodeBatch {
                kind,
                members,
                anchor: explicit,
            }
        }
        (_, Some(0)) => return Err(ArgsError::invalid(tool, "count must be at least 1")),
        (_, Some(count)) if count > MAX_BATCH => {
            return Err(ArgsError::invalid(
                tool,
                format!("at most {} nodes per call", MAX_BATCH),
            ))
        }
        (_, Some(count)) => NodeBatch {
            kind,
            members: vec![
                NodeDraft {
                    position: None,
                    attributes: args.attributes,
                };
                count
            ],
            anchor: explicit,
        },
        (_, None) => NodeBatch::new(
            kind,
            vec![NodeDraft {
                position: explicit,
                attributes: args.attributes,
            }],
        ),
    };

    Ok(RequestBody::CreateNodes(batch))
}
