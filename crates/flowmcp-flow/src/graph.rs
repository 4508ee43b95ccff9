//! Flow graph compilation.
//!
//! `CompiledFlow` is the executable view of a persisted `Flow`: nodes indexed
//! by id, per-node `Successors` built from the edge list in declaration
//! order, and the single start node.

use std::collections::{HashMap, HashSet, VecDeque};

use flowmcp_core::{Flow, FlowNode, NodeType, Successors};
use tracing::debug;

use crate::error::FlowError;

#[derive(Debug, Clone)]
pub struct CompiledFlow {
    flow_id: String,
    name: String,
    start: String,
    nodes: HashMap<String, FlowNode>,
    successors: HashMap<String, Successors>,
}

impl CompiledFlow {
    /// Validate `flow` and build its successor maps.
    ///
    /// Rejects duplicate node ids, edges that reference missing nodes, two
    /// edges leaving one node under the same action, and flows without
    /// exactly one start node.
    pub fn compile(flow: &Flow) -> Result<Self, FlowError> {
        let mut nodes = HashMap::with_capacity(flow.nodes.len());
        for node in &flow.nodes {
            if nodes.insert(node.id.clone(), node.clone()).is_some() {
                return Err(FlowError::invalid_graph(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }

        let mut successors: HashMap<String, Successors> = nodes
            .keys()
            .map(|id| (id.clone(), Successors::new()))
            .collect();
        for edge in &flow.edges {
            for end in [&edge.source, &edge.target] {
                if !nodes.contains_key(end) {
                    return Err(FlowError::invalid_graph(format!(
                        "edge {} -> {} references missing node '{end}'",
                        edge.source, edge.target
                    )));
                }
            }
            let inserted = successors
                .entry(edge.source.clone())
                .or_default()
                .insert(edge.action.clone(), edge.target.clone());
            if !inserted {
                return Err(FlowError::invalid_graph(format!(
                    "node '{}' has two '{}' edges",
                    edge.source, edge.action
                )));
            }
        }

        let starts: Vec<&FlowNode> = flow
            .nodes
            .iter()
            .filter(|n| n.node_type() == NodeType::Start)
            .collect();
        let start = match starts.as_slice() {
            [only] => only.id.clone(),
            [] => return Err(FlowError::invalid_graph("flow has no start node")),
            _ => {
                return Err(FlowError::invalid_graph(format!(
                    "flow has {} start nodes",
                    starts.len()
                )));
            }
        };

        let compiled = Self {
            flow_id: flow.id.clone(),
            name: flow.name.clone(),
            start,
            nodes,
            successors,
        };

        let reachable = compiled.reachable();
        if reachable.len() < compiled.nodes.len() {
            debug!(
                flow_id = %compiled.flow_id,
                unreachable = compiled.nodes.len() - reachable.len(),
                "Flow has nodes unreachable from start"
            );
        }

        Ok(compiled)
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.get(id)
    }

    /// Outgoing edges of `id`; empty for terminal nodes, `None` for unknown ids.
    pub fn successors(&self, id: &str) -> Option<&Successors> {
        self.successors.get(id)
    }

    /// Node ids reachable from the start node.
    pub fn reachable(&self) -> HashSet<&str> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([self.start.as_str()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(successors) = self.successors(id) {
                queue.extend(successors.iter().map(|(_, target)| target));
            }
        }
        seen
    }
}
