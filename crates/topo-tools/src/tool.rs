//! The tool catalogue
//!
//! Tool names form a closed set; every name maps to exactly one translation
//! in [`crate::args`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    CreateHost,
    CreateSwitch,
    CreateController,
    /// Any node kind, including NAT nodes and routers
    CreateNode,
    CreateLink,
    AssociateSwitch,
    RunCommand,
    RunPingall,
    DeleteNode,
    DeleteLink,
    MoveNode,
    StartNetwork,
    ExportTopology,
    GetTopology,
}

impl ToolName {
    pub const ALL: [ToolName; 14] = [
        ToolName::CreateHost,
        ToolName::CreateSwitch,
        ToolName::CreateController,
        ToolName::CreateNode,
        ToolName::CreateLink,
        ToolName::AssociateSwitch,
        ToolName::RunCommand,
        ToolName::RunPingall,
        ToolName::DeleteNode,
        ToolName::DeleteLink,
        ToolName::MoveNode,
        ToolName::StartNetwork,
        ToolName::ExportTopology,
        ToolName::GetTopology,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::CreateHost => "create_host",
            ToolName::CreateSwitch => "create_switch",
            ToolName::CreateController => "create_controller",
            ToolName::CreateNode => "create_node",
            ToolName::CreateLink => "create_link",
            ToolName::AssociateSwitch => "associate_switch",
            ToolName::RunCommand => "run_command",
            ToolName::RunPingall => "run_pingall",
            ToolName::DeleteNode => "delete_node",
            ToolName::DeleteLink => "delete_link",
            ToolName::MoveNode => "move_node",
            ToolName::StartNetwork => "start_network",
            ToolName::ExportTopology => "export_topology",
            ToolName::GetTopology => "get_topology",
        }
    }

    /// Exact, case-sensitive lookup
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            ToolName::RunCommand
                | ToolName::RunPingall
                | ToolName::ExportTopology
                | ToolName::GetTopology
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            ToolName::RunCommand | ToolName::RunPingall => "diagnostics",
            ToolName::StartNetwork => "network",
            ToolName::ExportTopology | ToolName::GetTopology => "query",
            _ => "topology",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::CreateHost => "Create one or more host nodes in the topology.",
            ToolName::CreateSwitch => "Create one or more switch nodes in the topology.",
            ToolName::CreateController => {
                "Create one or more controllers. Set remote with ip/port for a remote controller."
            }
            ToolName::CreateNode => {
                "Create nodes of any kind (host, switch, controller, nat, router)."
            }
            ToolName::CreateLink => "Create a link between two existing nodes by id.",
            ToolName::AssociateSwitch => "Attach a switch to a controller.",
            ToolName::RunCommand => "Run a shell command in a node terminal.",
            ToolName::RunPingall => "Run Mininet pingall test.",
            ToolName::DeleteNode => {
                "Delete a node by id. Links and controller associations of the node go with it."
            }
            ToolName::DeleteLink => "Delete a link, by backend link id or by its endpoints.",
            ToolName::MoveNode => "Move an existing node to a new canvas position.",
            ToolName::StartNetwork => {
                "Build and start the Mininet network. Fails if it is already running."
            }
            ToolName::ExportTopology => "Export the topology as a runnable Mininet Python script.",
            ToolName::GetTopology => "Return the current confirmed topology.",
        }
    }

    pub fn input_schema(&self) -> Value {
        match self {
            ToolName::CreateHost => node_schema(
                "host",
                json!({
                    "ip": { "type": "string", "description": "Host address, e.g. 10.0.0.5" },
                    "mac": { "type": "string", "description": "Host MAC address." }
                }),
            ),
            ToolName::CreateSwitch => node_schema("switch", json!({})),
            ToolName::CreateController => node_schema(
                "controller",
                json!({
                    "remote": { "type": "boolean", "description": "Use a remote controller." },
                    "ip": { "type": "string", "description": "Remote controller address." },
                    "port": { "type": "integer", "description": "Remote controller port (default 6653)." }
                }),
            ),
            ToolName::CreateNode => {
                let mut schema = node_schema(
                    "node",
                    json!({
                        "kind": {
                            "type": "string",
                            "enum": ["host", "switch", "controller", "nat", "router"]
                        }
                    }),
                );
                schema["required"] = json!(["kind"]);
                schema
            }
            ToolName::CreateLink => json!({
                "type": "object",
                "properties": {
                    "from": { "type": "string", "description": "Source node id, e.g. h1" },
                    "to": { "type": "string", "description": "Destination node id, e.g. s1" },
                    "options": { "type": "object", "description": "Link options such as bw or delay." }
                },
                "required": ["from", "to"]
            }),
            ToolName::AssociateSwitch => json!({
                "type": "object",
                "properties": {
                    "switch_id": { "type": "string", "description": "Switch id, e.g. s1" },
                    "controller_id": { "type": "string", "description": "Controller id, e.g. c1" }
                },
                "required": ["switch_id", "controller_id"]
            }),
            ToolName::RunCommand => json!({
                "type": "object",
                "properties": {
                    "node_id": { "type": "string", "description": "Node id, e.g. h1" },
                    "command": { "type": "string", "description": "Command to execute" }
                },
                "required": ["node_id", "command"]
            }),
            ToolName::DeleteNode => json!({
                "type": "object",
                "properties": {
                    "node_id": { "type": "string", "description": "Node id, e.g. h1" }
                },
                "required": ["node_id"]
            }),
            ToolName::DeleteLink => json!({
                "type": "object",
                "properties": {
                    "link_id": { "type": "string", "description": "Backend link id" },
                    "from": { "type": "string", "description": "Source node id" },
                    "to": { "type": "string", "description": "Destination node id" }
                }
            }),
            ToolName::MoveNode => json!({
                "type": "object",
                "properties": {
                    "node_id": { "type": "string", "description": "Node id, e.g. h1" },
                    "x": { "type": "number", "description": "New x position in canvas coordinates." },
                    "y": { "type": "number", "description": "New y position in canvas coordinates." }
                },
                "required": ["node_id", "x", "y"]
            }),
            ToolName::RunPingall
            | ToolName::StartNetwork
            | ToolName::ExportTopology
            | ToolName::GetTopology => json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.as_str().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
            category: self.category().to_string(),
            read_only: self.is_read_only(),
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema shared by the node creation tools. `extra` holds the kind's
/// attributes, accepted at the top level and on each batch member.
fn node_schema(noun: &str, extra: Value) -> Value {
    let mut member = json!({
        "x": { "type": "number" },
        "y": { "type": "number" }
    });
    if let (Some(props), Value::Object(extra)) = (member.as_object_mut(), &extra) {
        props.extend(extra.clone());
    }
    let mut properties = json!({
        "x": { "type": "number", "description": "Optional x position in canvas coordinates." },
        "y": { "type": "number", "description": "Optional y position in canvas coordinates." },
        "count": {
            "type": "integer",
            "minimum": 1,
            "description": format!("Number of {}s to create with automatic positions.", noun)
        },
        "nodes": {
            "type": "array",
            "description": format!("Batch create {}s with positions.", noun),
            "items": {
                "type": "object",
                "properties": member,
                "required": []
            }
        }
    });
    if let (Some(props), Value::Object(extra)) = (properties.as_object_mut(), extra) {
        props.extend(extra);
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": []
    })
}

/// Tool metadata for catalogues and LLM requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub category: String,
    #[serde(default)]
    pub read_only: bool,
}

impl ToolDefinition {
    /// Every tool in the catalogue
    pub fn all() -> Vec<ToolDefinition> {
        ToolName::ALL.iter().map(ToolName::definition).collect()
    }

    /// Convert to OpenAI function calling format
    pub fn to_openai_format(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for tool in ToolName::ALL {
            assert_eq!(ToolName::parse(tool.as_str()), Some(tool));
        }
        assert_eq!(ToolName::parse("Create_Host"), None);
        assert_eq!(ToolName::parse("rm_rf"), None);
    }

    #[test]
    fn test_openai_format() {
        let def = ToolName::CreateLink.definition();
        let openai = def.to_openai_format();
        assert_eq!(openai["type"], "function");
        assert_eq!(openai["function"]["name"], "create_link");
        assert_eq!(
            openai["function"]["parameters"]["required"],
            json!(["from", "to"])
        );
    }

    #[test]
    fn test_controller_schema_has_remote_fields() {
        let schema = ToolName::CreateController.input_schema();
        assert_eq!(schema["properties"]["port"]["type"], "integer");
        assert_eq!(schema["properties"]["nodes"]["type"], "array");
        assert_eq!(ToolName::CreateNode.input_schema()["required"], json!(["kind"]));
    }

    #[test]
    fn test_catalogue_is_complete() {
        let defs = ToolDefinition::all();
        assert_eq!(defs.len(), ToolName::ALL.len());
        assert!(defs.iter().any(|d| d.name == "get_topology" && d.read_only));
        assert!(defs.iter().any(|d| d.name == "start_network" && !d.read_only));
    }

    #[test]
    fn test_member_schema_carries_kind_attributes() {
        let schema = ToolName::CreateHost.input_schema();
        assert_eq!(schema["properties"]["ip"]["type"], "string");
        assert_eq!(schema["properties"]["nodes"]["items"]["properties"]["mac"]["type"], "string");
        assert!(ToolName::CreateSwitch.input_schema()["properties"]
            .get("controller")
            .is_none());
        assert_eq!(
            ToolName::MoveNode.input_schema()["required"],
            json!(["node_id", "x", "y"])
        );
    }
}
