//! Static description of a distribution network.

use crate::error::{ReconfigError, Result};
use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

/// Index of a bus in [`Network::nodes`].
pub type NodeId = usize;

/// Index of a line in [`Network::lines`].
pub type LineId = usize;

/// A bus of the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Providers (substations, feeding points) are the roots of the radial forest.
    pub is_provider: bool,
}

impl Node {
    /// Create a consumer bus.
    pub fn consumer(id: NodeId, name: impl Into<String>) -> Self {
        Node {
            id,
            name: name.into(),
            is_provider: false,
        }
    }

    /// Create a provider bus.
    pub fn provider(id: NodeId, name: impl Into<String>) -> Self {
        Node {
            id,
            name: name.into(),
            is_provider: true,
        }
    }
}

/// A line (cable, overhead line or transformer) between two buses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub id: LineId,
    pub name: String,
    pub from: NodeId,
    pub to: NodeId,
    /// Whether the open/closed state is a decision variable.
    pub switchable: bool,
    /// Series resistance used by the loss estimate.
    pub resistance: f64,
    /// Thermal limit on the carried power, if any.
    pub capacity: Option<f64>,
    /// State of the switch in the field before optimization.
    pub initially_open: bool,
    /// Cost of operating this switch once.
    pub switching_cost: f64,
    /// For transformers that only operate in one direction: the end that must
    /// stay on the provider side.
    pub upstream_end: Option<NodeId>,
    /// Expected outages per hour; every bus fed through the line is cut off
    /// while it is repaired.
    #[serde(default)]
    pub failure_rate: f64,
}

impl Line {
    /// Create a fixed (always closed) line.
    pub fn fixed(id: LineId, from: NodeId, to: NodeId, resistance: f64) -> Self {
        Line {
            id,
            name: format!("L{}", id),
            from,
            to,
            switchable: false,
            resistance,
            capacity: None,
            initially_open: false,
            switching_cost: 0.0,
            upstream_end: None,
            failure_rate: 0.0,
        }
    }

    /// Create a switchable line.
    pub fn switch(
        id: LineId,
        from: NodeId,
        to: NodeId,
        resistance: f64,
        initially_open: bool,
    ) -> Self {
        Line {
            id,
            name: format!("S{}", id),
            from,
            to,
            switchable: true,
            resistance,
            capacity: None,
            initially_open,
            switching_cost: 1.0,
            upstream_end: None,
            failure_rate: 0.0,
        }
    }

    /// Set the thermal capacity.
    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the switching cost.
    pub fn with_switching_cost(mut self, cost: f64) -> Self {
        self.switching_cost = cost;
        self
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate;
        self
    }

    /// Require `node` to remain the upstream end of this line.
    pub fn with_upstream_end(mut self, node: NodeId) -> Self {
        self.upstream_end = Some(node);
        self
    }

    /// The endpoint opposite to `node`.
    pub fn other_end(&self, node: NodeId) -> NodeId {
        if self.from == node {
            self.to
        } else {
            self.from
        }
    }

    /// Whether `node` is one of the endpoints.
    pub fn touches(&self, node: NodeId) -> bool {
        self.from == node || self.to == node
    }
}

/// An immutable network: buses, lines and their adjacency.
#[derive(Debug, Clone)]
pub struct Network {
    pub nodes: Vec<Node>,
    pub lines: Vec<Line>,
    graph: UnGraph<NodeId, LineId>,
    providers: Vec<NodeId>,
    switchable: Vec<LineId>,
}

impl Network {
    /// Build a network, checking that ids are dense and endpoints exist.
    pub fn new(nodes: Vec<Node>, lines: Vec<Line>) -> Result<Self> {
        for (i, node) in nodes.iter().enumerate() {
            if node.id != i {
                return Err(ReconfigError::InvalidNetwork(format!(
                    "node at position {} has id {}",
                    i, node.id
                )));
            }
        }

        let mut graph = UnGraph::with_capacity(nodes.len(), lines.len());
        for node in &nodes {
            graph.add_node(node.id);
        }

        for (i, line) in lines.iter().enumerate() {
            if line.id != i {
                return Err(ReconfigError::InvalidNetwork(format!(
                    "line at position {} has id {}",
                    i, line.id
                )));
            }
            if line.from >= nodes.len() || line.to >= nodes.len() {
                return Err(ReconfigError::InvalidNetwork(format!(
                    "line {} references a missing bus",
                    line.id
                )));
            }
            if line.from == line.to {
                return Err(ReconfigError::InvalidNetwork(format!(
                    "line {} is a self loop",
                    line.id
                )));
            }
            if !(line.failure_rate.is_finite() && line.failure_rate >= 0.0) {
                return Err(ReconfigError::InvalidNetwork(format!(
                    "line {} has failure rate {}",
                    line.id, line.failure_rate
                )));
            }
            if let Some(end) = line.upstream_end {
                if !line.touches(end) {
                    return Err(ReconfigError::InvalidNetwork(format!(
                        "line {} has upstream end {} which is not one of its buses",
                        line.id, end
                    )));
                }
            }
            graph.add_edge(NodeIndex::new(line.from), NodeIndex::new(line.to), line.id);
        }

        let providers: Vec<NodeId> = nodes
            .iter()
            .filter(|n| n.is_provider)
            .map(|n| n.id)
            .collect();
        if providers.is_empty() {
            return Err(ReconfigError::InvalidNetwork(
                "the network has no provider".to_string(),
            ));
        }

        let switchable = lines
            .iter()
            .filter(|l| l.switchable)
            .map(|l| l.id)
            .collect();

        Ok(Network {
            nodes,
            lines,
            graph,
            providers,
            switchable,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, line: LineId) -> &Line {
        &self.lines[line]
    }

    pub fn is_provider(&self, node: NodeId) -> bool {
        self.nodes[node].is_provider
    }

    pub fn providers(&self) -> &[NodeId] {
        &self.providers
    }

    /// Whether the line state is a decision variable. Unknown lines are not.
    pub fn is_switchable(&self, line: LineId) -> bool {
        self.lines.get(line).map_or(false, |l| l.switchable)
    }

    /// All switchable lines in id order.
    pub fn switchable_lines(&self) -> &[LineId] {
        &self.switchable
    }

    /// Lines incident to `node`.
    pub fn incident_lines(&self, node: NodeId) -> impl Iterator<Item = LineId> + '_ {
        self.graph
            .edges(NodeIndex::new(node))
            .map(|edge| *edge.weight())
    }

    /// The open flags of the field state, one per line.
    pub fn initial_open_flags(&self) -> Vec<bool> {
        self.lines
            .iter()
            .map(|l| l.switchable && l.initially_open)
            .collect()
    }
}
