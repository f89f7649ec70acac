//! Node id and layout position allocation
//!
//! Ids grow monotonically per kind namespace (`h1, h2…`, `s1…`) and are never
//! handed out twice in a session, deletions included. Positions for members
//! without an explicit one follow a cursor that steps along x and wraps to the
//! next row along y, skipping every occupied coordinate.

use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::action::NodeBatch;
use crate::config::LayoutConfig;
use crate::types::{Node, NodeId, NodeKind, Position};

/// Default OpenFlow port for remote controllers
pub const DEFAULT_CONTROLLER_PORT: u64 = 6653;

/// Per-kind monotonic id counters
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    last: HashMap<NodeKind, u64>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the next id of `kind`, returning it with its ordinal
    pub fn next(&mut self, kind: NodeKind) -> (NodeId, u64) {
        let counter = self.last.entry(kind).or_insert(0);
        *counter += 1;
        (format!("{}{}", kind.prefix(), counter), *counter)
    }

    /// Advance past an id that already exists elsewhere (backend import)
    pub fn observe(&mut self, kind: NodeKind, id: &str) {
        let Some(ordinal) = id
            .strip_prefix(kind.prefix())
            .and_then(|rest| rest.parse::<u64>().ok())
        else {
            return;
        };
        let counter = self.last.entry(kind).or_insert(0);
        if ordinal > *counter {
            *counter = ordinal;
        }
    }
}

/// Walks grid positions: `+step` on x, wrapping after `columns` to `+step` on y
struct LayoutCursor<'a> {
    layout: &'a LayoutConfig,
    row_start: Position,
    last: Option<Position>,
    column: usize,
}

impl<'a> LayoutCursor<'a> {
    fn new(layout: &'a LayoutConfig, anchor: Position) -> Self {
        Self {
            layout,
            row_start: anchor,
            last: None,
            column: 0,
        }
    }

    fn advance(&mut self) -> Position {
        let next = match self.last {
            None => self.row_start,
            Some(prev) if self.column + 1 < self.layout.columns => {
                self.column += 1;
                Position::new(prev.x + self.layout.step, prev.y)
            }
            Some(prev) => {
                self.column = 0;
                self.row_start = Position::new(self.row_start.x, prev.y + self.layout.step);
                self.row_start
            }
        };
        self.last = Some(next);
        next
    }

    /// Next position not in `occupied`. Successive grid cells are distinct,
    /// so `occupied.len() + 1` steps always reach a free one.
    fn next_free(&mut self, occupied: &HashSet<(u64, u64)>) -> Position {
        for _ in 0..=occupied.len() {
            let candidate = self.advance();
            if !occupied.contains(&candidate.key()) {
                return candidate;
            }
        }
        let fallback = self.advance();
        warn!(x = fallback.x, y = fallback.y, "Layout grid exhausted, position may overlap");
        fallback
    }

    /// Continue the run from an explicitly placed node
    fn resume_after(&mut self, placed: Position) {
        self.row_start = placed;
        self.last = Some(placed);
        self.column = 0;
    }
}

/// Id and position allocation for node creation
#[derive(Debug, Clone)]
pub struct Allocator {
    ids: IdAllocator,
    layout: LayoutConfig,
}

impl Allocator {
    /// An invalid layout falls back to the default grid
    pub fn new(layout: LayoutConfig) -> Self {
        let layout = layout.validated().unwrap_or_else(|e| {
            warn!(error = %e, "Using default layout");
            LayoutConfig::default()
        });
        Self {
            ids: IdAllocator::new(),
            layout,
        }
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    /// Advance counters past every node in an imported topology
    pub fn observe_nodes<'a>(&mut self, nodes: impl IntoIterator<Item = &'a Node>) {
        for node in nodes {
            self.ids.observe(node.kind, &node.id);
        }
    }

    /// Allocate a single node: the hint if given, else the layout origin
    pub fn allocate(&mut self, kind: NodeKind, hint: Option<Position>) -> Node {
        let (id, ordinal) = self.ids.next(kind);
        let position = hint.unwrap_or(self.layout.origin);
        build_node(id, ordinal, kind, position, &Map::new())
    }

    /// Allocate every member of a batch, avoiding the `taken` positions and
    /// the positions of earlier members.
    pub fn allocate_batch(
        &mut self,
        batch: &NodeBatch,
        taken: impl IntoIterator<Item = Position>,
    ) -> Vec<Node> {
        let mut occupied: HashSet<(u64, u64)> = taken.into_iter().map(|p| p.key()).collect();
        let layout = self.layout.clone();
        let mut cursor = LayoutCursor::new(&layout, batch.anchor.unwrap_or(layout.origin));
        let mut nodes = Vec::with_capacity(batch.members.len());

        for draft in &batch.members {
            let (id, ordinal) = self.ids.next(batch.kind);
            let position = match draft.position {
                Some(explicit) => {
                    cursor.resume_after(explicit);
                    explicit
                }
                None => cursor.next_free(&occupied),
            };
            occupied.insert(position.key());
            nodes.push(build_node(id, ordinal, batch.kind, position, &draft.attributes));
        }

        nodes
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

fn build_node(
    id: NodeId,
    ordinal: u64,
    kind: NodeKind,
    position: Position,
    overrides: &Map<String, Value>,
) -> Node {
    let mut node = Node::new(id, kind, position);
    node.attributes = default_attributes(kind, ordinal);
    for (key, value) in overrides {
        node.attributes.insert(key.clone(), value.clone());
    }
    if kind == NodeKind::Controller {
        let remote = node
            .attributes
            .get("remote")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if remote && node.attributes.get("port").map_or(true, Value::is_null) {
            node.attributes
                .insert("port".into(), json!(DEFAULT_CONTROLLER_PORT));
        }
    }
    node
}

/// Attributes the backend schema expects per kind
fn default_attributes(kind: NodeKind, ordinal: u64) -> Map<String, Value> {
    let value = match kind {
        NodeKind::Host => {
            // 254 usable addresses per /24, skipping .0 and .255
            let index = ordinal.saturating_sub(1);
            json!({
                "ip": format!(
                    "10.{}.{}.{}",
                    (index / (254 * 256)) % 256,
                    (index / 254) % 256,
                    index % 254 + 1
                ),
                "mac": format!(
                    "00:00:00:{:02x}:{:02x}:{:02x}",
                    (ordinal >> 16) & 0xff,
                    (ordinal >> 8) & 0xff,
                    ordinal & 0xff
                ),
            })
        }
        NodeKind::Switch => json!({ "ports": 0, "controller": null }),
        NodeKind::Controller => json!({ "remote": false, "ip": null, "port": null }),
        NodeKind::Nat | NodeKind::Router => json!({}),
    };
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
