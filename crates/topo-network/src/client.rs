//! Mininet GUI backend REST client
//!
//! Maps each action onto one call against the `/api/mininet` API:
//!
//! ```text
//! POST   /api/mininet/{hosts,switches,controllers,nats,routers}   node body
//! POST   /api/mininet/links                                       [src, dst, options?]
//! POST   /api/mininet/associate_switch                            {"switch", "controller"}
//! POST   /api/mininet/run_command                                 {"node_id", "command"}
//! POST   /api/mininet/node_position                              {"node_id", "position": {x, y}}
//! POST   /api/mininet/pingall
//! POST   /api/mininet/start
//! GET    /api/mininet/export                                      -> {"script"}
//! DELETE /api/mininet/delete_node/{id}
//! DELETE /api/mininet/delete_link/{id}
//! ```
//!
//! Failing responses carry a FastAPI-style `{"detail": ...}` body which is
//! passed through verbatim.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use topo_core::{
    ActionBody, BackendResult, DeleteTarget, GatewayConfig, Link, LinkKey, LinkSelector, Node,
    NodeKind, Position, TopologyState,
};

use crate::error::GatewayError;
use crate::gateway::BackendGateway;

const API_PREFIX: &str = "/api/mininet";

/// Fields of the backend node schema that are not free-form attributes
const NODE_SCHEMA_FIELDS: &[&str] = &["id", "type", "x", "y"];

/// REST client for the Mininet GUI backend
pub struct MininetClient {
    client: Client,
    config: GatewayConfig,
}

impl MininetClient {
    /// Create a client from explicit configuration
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| GatewayError::Build(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Send one request and fold the answer into a [`BackendResult`]
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<BackendResult, GatewayError> {
        let url = format!("{}{}{}", self.config.base_url, API_PREFIX, path);
        debug!("{} {}", method, url);

        let mut req = self.client.request(method, &url);
        if let Some(auth) = self.config.auth_header() {
            req = req.header("Authorization", auth);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(&url, e))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GatewayError::from_reqwest(&url, e))?;

        Ok(normalize(status, &text))
    }

    async fn get_json(&self, path: &str) -> Result<Option<Value>, GatewayError> {
        let result = self.send(Method::GET, path, None).await?;
        match (result.ok, result.status) {
            (true, _) => Ok(Some(result.data)),
            (false, Some(404)) => Ok(None),
            (false, status) => Err(GatewayError::Decode(format!(
                "GET {} answered {}: {}",
                path,
                status.unwrap_or_default(),
                result.detail.unwrap_or_default()
            ))),
        }
    }

    fn request_for(action: &ActionBody) -> Option<(Method, String, Option<Value>)> {
        let request = match action {
            ActionBody::CreateNode { node } => (
                Method::POST,
                format!("/{}", node.kind.collection()),
                Some(node_to_wire(node)),
            ),
            ActionBody::CreateLink { link } => {
                let body = match &link.options {
                    Some(options) => json!([link.src, link.dst, options]),
                    None => json!([link.src, link.dst]),
                };
                (Method::POST, "/links".to_string(), Some(body))
            }
            ActionBody::AssociateSwitch {
                switch_id,
                controller_id,
            } => (
                Method::POST,
                "/associate_switch".to_string(),
                Some(json!({ "switch": switch_id, "controller": controller_id })),
            ),
            ActionBody::RunCommand { command } => (
                Method::POST,
                "/run_command".to_string(),
                Some(json!({ "node_id": command.node_id, "command": command.command })),
            ),
            ActionBody::DeletePath {
                target: DeleteTarget::Node { node_id },
            } => (Method::DELETE, format!("/delete_node/{}", node_id), None),
            ActionBody::DeletePath {
                target: DeleteTarget::Link { link },
            } => (
                Method::DELETE,
                format!("/delete_link/{}", link_path_id(link)),
                None,
            ),
            ActionBody::MoveNode { node_id, position } => (
                Method::POST,
                "/node_position".to_string(),
                Some(json!({ "node_id": node_id, "position": position })),
            ),
            ActionBody::Pingall => (Method::POST, "/pingall".to_string(), None),
            ActionBody::StartNetwork => (Method::POST, "/start".to_string(), None),
            ActionBody::Export => (Method::GET, "/export".to_string(), None),
            ActionBody::QueryTopology => return None,
        };
        Some(request)
    }
}

#[async_trait]
impl BackendGateway for MininetClient {
    fn name(&self) -> &str {
        "mininet"
    }

    async fn execute(&self, action: &ActionBody) -> Result<BackendResult, GatewayError> {
        let Some((method, path, body)) = Self::request_for(action) else {
            let snapshot = self.fetch_snapshot().await?;
            let data = serde_json::to_value(&snapshot)
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            return Ok(BackendResult::success(data));
        };

        let result = self.send(method, &path, body.as_ref()).await?;
        if !result.ok {
            info!(
                action = action.name(),
                status = ?result.status,
                detail = ?result.detail,
                "Backend refused action"
            );
        }
        Ok(result)
    }

    async fn fetch_snapshot(&self) -> Result<TopologyState, GatewayError> {
        let mut state = TopologyState::new();

        for kind in NodeKind::ALL {
            let path = format!("/{}", kind.collection());
            let Some(payload) = self.get_json(&path).await? else {
                // older backends only serve hosts, switches and controllers
                debug!("No {} collection on backend", kind.collection());
                continue;
            };
            for node in nodes_from_wire(kind, &payload)? {
                let controller = node.attribute("controller").and_then(Value::as_str);
                if let (NodeKind::Switch, Some(controller)) = (kind, controller) {
                    state
                        .associations
                        .insert(node.id.clone(), controller.to_string());
                }
                state.nodes.insert(node.id.clone(), node);
            }
        }

        if let Some(payload) = self.get_json("/links").await? {
            for link in links_from_wire(&payload)? {
                state.links.insert(link.key(), link);
            }
        }

        info!(
            nodes = state.nodes.len(),
            links = state.links.len(),
            "Fetched backend topology snapshot"
        );
        Ok(state)
    }
}

/// Fold an HTTP answer into the uniform result shape
fn normalize(status: StatusCode, text: &str) -> BackendResult {
    let data = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
    };

    if status.is_success() {
        return BackendResult {
            ok: true,
            data,
            status: Some(status.as_u16()),
            detail: None,
        };
    }

    let detail = match data.get("detail") {
        Some(Value::String(detail)) => detail.clone(),
        Some(other) => other.to_string(),
        None => match &data {
            Value::String(s) => s.clone(),
            Value::Null => status.to_string(),
            other => other.to_string(),
        },
    };

    BackendResult {
        ok: false,
        data,
        status: Some(status.as_u16()),
        detail: Some(detail),
    }
}

/// Wire id for link deletion
fn link_path_id(selector: &LinkSelector) -> String {
    match selector {
        LinkSelector::Endpoints { src, dst } => LinkKey::new(src.clone(), dst.clone()).to_string(),
        LinkSelector::Id(id) => id.clone(),
    }
}

/// Backend node schema: `{id, type, name, label, x, y, ..attributes}`
pub fn node_to_wire(node: &Node) -> Value {
    let mut body = Map::new();
    body.insert("id".into(), json!(node.id));
    body.insert("type".into(), json!(node.kind.as_str()));
    body.insert("name".into(), json!(node.id));
    body.insert("label".into(), json!(node.id));
    body.insert("x".into(), json!(node.position.x));
    body.insert("y".into(), json!(node.position.y));
    for (key, value) in &node.attributes {
        body.entry(key.clone()).or_insert_with(|| value.clone());
    }
    Value::Object(body)
}

/// Parse a node collection, served either as a list or as a map keyed by name
pub fn nodes_from_wire(kind: NodeKind, payload: &Value) -> Result<Vec<Node>, GatewayError> {
    let items: Vec<&Value> = match payload {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        Value::Null => Vec::new(),
        other => {
            return Err(GatewayError::Decode(format!(
                "expected {} collection, got {}",
                kind.collection(),
                other
            )))
        }
    };

    let mut nodes = Vec::with_capacity(items.len());
    for item in items {
        let Some(fields) = item.as_object() else {
            warn!(kind = %kind, "Skipping malformed node entry: {}", item);
            continue;
        };
        let Some(id) = fields
            .get("id")
            .or_else(|| fields.get("name"))
            .and_then(wire_string)
        else {
            warn!(kind = %kind, "Skipping node entry without id: {}", item);
            continue;
        };

        let coord = |axis: &str| fields.get(axis).and_then(Value::as_f64).unwrap_or(0.0);
        let mut node = Node::new(id, kind, Position::new(coord("x"), coord("y")));
        for (key, value) in fields {
            if !NODE_SCHEMA_FIELDS.contains(&key.as_str()) {
                node.attributes.insert(key.clone(), value.clone());
            }
        }
        nodes.push(node);
    }
    Ok(nodes)
}

/// Parse the link list: `[src, dst]` pairs or `{src, dst, id?}` objects
pub fn links_from_wire(payload: &Value) -> Result<Vec<Link>, GatewayError> {
    let Some(items) = payload.as_array() else {
        return Err(GatewayError::Decode(format!(
            "expected link list, got {}",
            payload
        )));
    };

    let mut links = Vec::with_capacity(items.len());
    for item in items {
        let link = match item {
            Value::Array(pair) if pair.len() >= 2 => {
                match (wire_string(&pair[0]), wire_string(&pair[1])) {
                    (Some(src), Some(dst)) => {
                        let mut link = Link::new(src, dst);
                        link.options = pair.get(2).and_then(Value::as_object).cloned();
                        Some(link)
                    }
                    _ => None,
                }
            }
            Value::Object(fields) => {
                let endpoint = |a: &str, b: &str| {
                    fields.get(a).or_else(|| fields.get(b)).and_then(wire_string)
                };
                match (endpoint("src", "source"), endpoint("dst", "target")) {
                    (Some(src), Some(dst)) => {
                        let mut link = Link::new(src, dst);
                        link.id = fields.get("id").and_then(wire_string);
                        link.options = fields.get("options").and_then(Value::as_object).cloned();
                        Some(link)
                    }
                    _ => None,
                }
            }
            _ => None,
        };

        match link {
            Some(link) => links.push(link),
            None => warn!("Skipping malformed link entry: {}", item),
        }
    }
    Ok(links)
}

fn wire_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
