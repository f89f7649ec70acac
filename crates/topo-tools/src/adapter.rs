//! Tool calls in, tool responses out
//!
//! Every call yields exactly one [`ToolResponse`], in input order. Calls that
//! fail to parse are answered directly; the rest are submitted to the
//! orchestrator as one batch so that later calls can reference nodes created
//! by earlier ones.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use topo_core::{ActionError, ErrorKind, Outcome, Request};
use topo_dispatch::Orchestrator;

use crate::args::translate;
use crate::tool::{ToolDefinition, ToolName};

/// Arguments as produced by the model: usually a JSON-encoded string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArguments {
    Text(String),
    Json(Value),
}

impl ToolArguments {
    /// Decode into a JSON value; blank text means no arguments
    pub fn decode(&self) -> Result<Value, serde_json::Error> {
        match self {
            ToolArguments::Text(text) if text.trim().is_empty() => Ok(Value::Object(Map::new())),
            ToolArguments::Text(text) => serde_json::from_str(text),
            ToolArguments::Json(value) => Ok(value.clone()),
        }
    }
}

/// One tool invocation
///
/// Deserializes from the flat `{id, name, arguments}` shape or from the
/// OpenAI `{id, type, function: {name, arguments}}` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ToolCallWire")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<ToolArguments>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ToolCallWire {
    Function {
        #[serde(default)]
        id: String,
        function: FunctionWire,
    },
    Flat {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default, alias = "argumentsJson")]
        arguments: Option<ToolArguments>,
    },
}

#[derive(Deserialize)]
struct FunctionWire {
    name: String,
    #[serde(default)]
    arguments: Option<ToolArguments>,
}

impl From<ToolCallWire> for ToolCall {
    fn from(wire: ToolCallWire) -> Self {
        match wire {
            ToolCallWire::Function { id, function } => ToolCall {
                id,
                name: function.name,
                arguments: function.arguments,
            },
            ToolCallWire::Flat {
                id,
                name,
                arguments,
            } => ToolCall {
                id,
                name,
                arguments,
            },
        }
    }
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: Some(ToolArguments::Json(arguments)),
        }
    }

    /// Arguments exactly as the model encoded them
    pub fn with_raw_arguments(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: Some(ToolArguments::Text(arguments.into())),
        }
    }

    /// Extract tool calls from a chat completion
    ///
    /// Accepts a full response (`choices[0].message.tool_calls`), a bare
    /// assistant message, or a plain array of calls.
    pub fn from_completion(value: &Value) -> Result<Vec<ToolCall>, serde_json::Error> {
        let calls = if value.is_array() {
            value
        } else if let Some(calls) = value.pointer("/choices/0/message/tool_calls") {
            calls
        } else if let Some(calls) = value.get("tool_calls") {
            calls
        } else {
            return Ok(Vec::new());
        };
        Vec::<ToolCall>::deserialize(calls)
    }

    /// Parse and translate this call into an orchestrator request
    fn prepare(&self) -> Result<Request, ActionError> {
        let args = match &self.arguments {
            None => Value::Object(Map::new()),
            Some(raw) => raw.decode().map_err(|_| {
                ActionError::new(ErrorKind::ParseError, "Invalid tool arguments JSON.")
            })?,
        };
        let tool = ToolName::parse(&self.name).ok_or_else(|| {
            ActionError::new(
                ErrorKind::UnknownTool,
                format!("Unknown tool: {}", self.name),
            )
        })?;
        let body = translate(tool, args)
            .map_err(|e| ActionError::new(ErrorKind::ParseError, e.to_string()))?;

        Ok(if self.id.is_empty() {
            Request::anonymous(body)
        } else {
            Request::new(self.id.as_str(), body)
        })
    }
}

/// What goes back to the model for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub role: String,
    pub tool_call_id: String,
    /// JSON-encoded `{ok, output}` or `{error, kind, ...}`
    pub content: String,
}

impl ToolResponse {
    fn new(tool_call_id: &str, content: Value) -> Self {
        Self {
            role: "tool".to_string(),
            tool_call_id: tool_call_id.to_string(),
            content: content.to_string(),
        }
    }

    fn rejected(tool_call_id: &str, error: &ActionError) -> Self {
        Self::new(
            tool_call_id,
            json!({ "error": error.message, "kind": error.kind }),
        )
    }

    /// Fold the outcomes one call expanded into
    fn from_outcomes(tool_call_id: &str, outcomes: &[Outcome]) -> Self {
        let output = |o: &Outcome| o.result.clone().unwrap_or(Value::Null);

        if let [single] = outcomes {
            return match &single.error {
                None => Self::new(tool_call_id, json!({ "ok": true, "output": output(single) })),
                Some(error) => Self::rejected(tool_call_id, error),
            };
        }

        let failed: Vec<&Outcome> = outcomes.iter().filter(|o| !o.success).collect();
        let succeeded: Vec<Value> = outcomes.iter().filter(|o| o.success).map(output).collect();

        match failed.first().and_then(|o| o.error.as_ref()) {
            None => Self::new(tool_call_id, json!({ "ok": true, "output": succeeded })),
            Some(first) => Self::new(
                tool_call_id,
                json!({
                    "error": format!(
                        "{} of {} actions failed: {}",
                        failed.len(),
                        outcomes.len(),
                        first.message
                    ),
                    "kind": first.kind,
                    "succeeded": succeeded,
                    "failed": failed
                        .iter()
                        .map(|o| json!({ "correlation_id": o.correlation_id, "error": o.error }))
                        .collect::<Vec<_>>(),
                }),
            ),
        }
    }

    /// Decoded content; non-JSON content comes back as a string
    pub fn content_json(&self) -> Value {
        serde_json::from_str(&self.content).unwrap_or_else(|_| Value::String(self.content.clone()))
    }

    pub fn is_ok(&self) -> bool {
        self.content_json()["ok"] == Value::Bool(true)
    }
}

/// Runs tool calls through the orchestrator
pub struct ToolCallAdapter {
    orchestrator: Arc<Orchestrator>,
}

impl ToolCallAdapter {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Tool list for the completion request
    pub fn openai_tools(&self) -> Vec<Value> {
        ToolDefinition::all()
            .iter()
            .map(ToolDefinition::to_openai_format)
            .collect()
    }

    #[instrument(skip(self, calls), fields(calls = calls.len()))]
    pub async fn invoke(&self, calls: Vec<ToolCall>) -> Vec<ToolResponse> {
        let mut requests = Vec::with_capacity(calls.len());
        let mut rejections = Vec::with_capacity(calls.len());
        for call in &calls {
            match call.prepare() {
                Ok(request) => {
                    requests.push(request);
                    rejections.push(None);
                }
                Err(error) => {
                    debug!("Tool call {} ({}) rejected: {}", call.id, call.name, error);
                    rejections.push(Some(error));
                }
            }
        }

        let report = if requests.is_empty() {
            None
        } else {
            Some(self.orchestrator.dispatch(requests).await)
        };
        if let Some(report) = &report {
            info!(
                "Tool batch {} finished: {} actions, {} failed",
                report.batch_id,
                report.outcomes.len(),
                report.failures().count()
            );
        }

        let mut next = 0;
        calls
            .iter()
            .zip(rejections)
            .map(|(call, rejection)| match rejection {
                Some(error) => ToolResponse::rejected(&call.id, &error),
                None => {
                    let outcomes = report
                        .as_ref()
                        .map(|r| r.outcomes_for(next))
                        .unwrap_or(&[]);
                    next += 1;
                    ToolResponse::from_outcomes(&call.id, outcomes)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_shape_is_accepted() {
        let call: ToolCall = serde_json::from_value(json!({
            "id": "call_1",
            "type": "function",
            "function": { "name": "create_host", "arguments": "{\"x\": 10, \"y\": 20}" }
        }))
        .unwrap();
        assert_eq!(call.name, "create_host");
        assert_eq!(
            call.arguments.unwrap().decode().unwrap(),
            json!({"x": 10, "y": 20})
        );
    }

    #[test]
    fn test_flat_shape_is_accepted() {
        let call: ToolCall = serde_json::from_value(json!({
            "id": "call_2",
            "name": "create_link",
            "argumentsJson": "{\"from\":\"h1\",\"to\":\"s1\"}"
        }))
        .unwrap();
        assert_eq!(call.id, "call_2");
        assert!(matches!(call.arguments, Some(ToolArguments::Text(_))));

        let call: ToolCall =
            serde_json::from_value(json!({"id": "c", "name": "get_topology"})).unwrap();
        assert_eq!(call.arguments, None);
    }

    #[test]
    fn test_from_completion() {
        let completion = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [
                        {"id": "a", "type": "function", "function": {"name": "run_pingall", "arguments": "{}"}},
                        {"id": "b", "type": "function", "function": {"name": "get_topology", "arguments": ""}}
                    ]
                }
            }]
        });
        let calls = ToolCall::from_completion(&completion).unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].arguments.as_ref().unwrap().decode().unwrap(), json!({}));
        assert!(ToolCall::from_completion(&json!({"content": "hi"}))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_prepare_errors() {
        let bad = ToolCall::with_raw_arguments("c1", "create_host", "{x: 1");
        assert_eq!(bad.prepare().unwrap_err().kind, ErrorKind::ParseError);

        let unknown = ToolCall::new("c2", "format_disk", json!({}));
        let err = unknown.prepare().unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownTool);
        assert_eq!(err.message, "Unknown tool: format_disk");

        let missing = ToolCall::new("c3", "run_command", json!({"node_id": "h1"}));
        assert_eq!(missing.prepare().unwrap_err().kind, ErrorKind::ParseError);

        let ok = ToolCall::new("c4", "create_switch", json!({})).prepare().unwrap();
        assert_eq!(ok.correlation_id, "c4");
    }

    #[test]
    fn test_response_folding() {
        let single = ToolResponse::from_outcomes("c", &[Outcome::ok("c", json!({"created": 1}))]);
        assert_eq!(single.role, "tool");
        assert_eq!(
            single.content_json(),
            json!({"ok": true, "output": {"created": 1}})
        );

        let mixed = ToolResponse::from_outcomes(
            "c",
            &[
                Outcome::ok("c#0", json!(1)),
                Outcome::failed(
                    "c#1",
                    ActionError::new(ErrorKind::BackendFailure, "port in use"),
                ),
            ],
        );
        let content = mixed.content_json();
        assert!(!mixed.is_ok());
        assert_eq!(content["kind"], "backend_failure");
        assert_eq!(content["succeeded"], json!([1]));
        assert_eq!(content["failed"][0]["correlation_id"], "c#1");
        assert!(content["error"].as_str().unwrap().contains("port in use"));
    }
}
