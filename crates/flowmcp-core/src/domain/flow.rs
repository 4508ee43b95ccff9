//! Flow graph domain types.
//!
//! A `Flow` is the persisted definition: nodes plus labeled edges. Executors
//! turn the edge list into per-node `Successors` (an ordered action -> node
//! map) before walking the graph.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Action label used when an edge does not name one.
pub const DEFAULT_ACTION: &str = "default";

fn default_action() -> String {
    DEFAULT_ACTION.to_string()
}

/// A persisted flow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
}

impl Flow {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Append a node.
    #[must_use]
    pub fn with_node(mut self, node: FlowNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Append an edge labeled with the default action.
    #[must_use]
    pub fn with_edge(self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.with_action_edge(source, target, DEFAULT_ACTION)
    }

    /// Append an edge with an explicit action label.
    #[must_use]
    pub fn with_action_edge(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        self.edges.push(FlowEdge {
            source: source.into(),
            target: target.into(),
            action: action.into(),
        });
        self
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Directed, labeled edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub source: String,
    pub target: String,
    #[serde(default = "default_action")]
    pub action: String,
}

/// One node of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub const fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }
}

/// Node kind with its kind-specific properties.
///
/// A node may omit `properties` (or set it to `null`); the kind's defaults
/// apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "properties", rename_all = "kebab-case")]
pub enum NodeKind {
    Start(StartProperties),
    Process(ProcessProperties),
    Finish(FinishProperties),
    McpTool(McpToolProperties),
}

impl<'de> Deserialize<'de> for NodeKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Tagged {
            #[serde(rename = "type")]
            node_type: NodeType,
            #[serde(default)]
            properties: Option<Value>,
        }

        fn properties<T: DeserializeOwned + Default, E: de::Error>(
            value: Option<Value>,
        ) -> Result<T, E> {
            value.map_or_else(|| Ok(T::default()), |v| serde_json::from_value(v).map_err(E::custom))
        }

        let tagged = Tagged::deserialize(deserializer)?;
        Ok(match tagged.node_type {
            NodeType::Start => Self::Start(properties(tagged.properties)?),
            NodeType::Process => Self::Process(properties(tagged.properties)?),
            NodeType::Finish => Self::Finish(properties(tagged.properties)?),
            NodeType::McpTool => Self::McpTool(properties(tagged.properties)?),
        })
    }
}

impl NodeKind {
    pub const fn node_type(&self) -> NodeType {
        match self {
            Self::Start(_) => NodeType::Start,
            Self::Process(_) => NodeType::Process,
            Self::Finish(_) => NodeType::Finish,
            Self::McpTool(_) => NodeType::McpTool,
        }
    }
}

/// Tag-only view of `NodeKind`, used in traces and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Start,
    Process,
    Finish,
    McpTool,
}

impl NodeType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Process => "process",
            Self::Finish => "finish",
            Self::McpTool => "mcp-tool",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start node: seeds the system prompt and the opening user turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StartProperties {
    /// Template for the conversation's system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Template for the opening user message. Defaults to `{{user_input}}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

/// Process node: one model turn, with optional tool calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessProperties {
    /// Extra instruction template appended to the system prompt for this turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Finish node: closes the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FinishProperties {
    /// Template for a closing assistant message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// MCP tool node: binds a server and exposes (a subset of) its tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct McpToolProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_server: Option<String>,
    /// Allow-list of original tool names. Empty means every tool.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enabled_tools: Vec<String>,
    /// Environment overrides recorded into the MCP context.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl McpToolProperties {
    pub fn bound_to(server: impl Into<String>) -> Self {
        Self {
            mcp_server: Some(server.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_enabled_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_tools = tools.into_iter().map(Into::into).collect();
        self
    }
}

/// Ordered mapping from action label to next node id.
///
/// Insertion order is significant: the first entry is the fallback when a
/// node returns an action it has no edge for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Successors(IndexMap<String, String>);

impl Successors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an edge. Returns `false` if the action was already present.
    pub fn insert(&mut self, action: impl Into<String>, target: impl Into<String>) -> bool {
        let action = action.into();
        if self.0.contains_key(&action) {
            return false;
        }
        self.0.insert(action, target.into());
        true
    }

    pub fn get(&self, action: &str) -> Option<&str> {
        self.0.get(action).map(String::as_str)
    }

    /// First declared successor, if any.
    pub fn first(&self) -> Option<(&str, &str)> {
        self.0.first().map(|(a, t)| (a.as_str(), t.as_str()))
    }

    /// Next node for `action`: exact match, else the first declared successor.
    pub fn resolve(&self, action: &str) -> Option<&str> {
        self.get(action).or_else(|| self.first().map(|(_, t)| t))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(a, t)| (a.as_str(), t.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_wire_shape() {
        let node = FlowNode::new(
            "tools",
            NodeKind::McpTool(McpToolProperties::bound_to("calc").with_enabled_tools(["add"])),
        );
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["id"], "tools");
        assert_eq!(json["type"], "mcp-tool");
        assert_eq!(json["properties"]["mcpServer"], "calc");
        assert_eq!(json["properties"]["enabledTools"][0], "add");

        let back: FlowNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_node_properties_are_optional() {
        let done: FlowNode = serde_json::from_str(r#"{"id":"done","type":"finish"}"#).unwrap();
        assert_eq!(done.kind, NodeKind::Finish(FinishProperties::default()));

        let start: FlowNode =
            serde_json::from_str(r#"{"id":"s","name":"Begin","type":"start","properties":null}"#)
                .unwrap();
        assert_eq!(start.display_name(), "Begin");
        assert_eq!(start.kind, NodeKind::Start(StartProperties::default()));

        let unknown = serde_json::from_str::<FlowNode>(r#"{"id":"x","type":"teleport"}"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn test_edge_defaults_action() {
        let edge: FlowEdge = serde_json::from_str(r#"{"source":"a","target":"b"}"#).unwrap();
        assert_eq!(edge.action, DEFAULT_ACTION);
    }

    #[test]
    fn test_successors_fall_back_to_first() {
        let mut successors = Successors::new();
        assert!(successors.insert("default", "next"));
        assert!(successors.insert("error", "recover"));
        assert!(!successors.insert("default", "elsewhere"));

        assert_eq!(successors.resolve("error"), Some("recover"));
        assert_eq!(successors.resolve("unknown"), Some("next"));
        assert_eq!(successors.len(), 2);
    }

    #[test]
    fn test_empty_successors_resolve_to_none() {
        assert_eq!(Successors::new().resolve("default"), None);
    }

    #[test]
    fn test_successor_order_survives_serde() {
        let mut successors = Successors::new();
        successors.insert("z", "1");
        successors.insert("a", "2");
        let json = serde_json::to_string(&successors).unwrap();
        assert_eq!(json, r#"{"z":"1","a":"2"}"#);
        let back: Successors = serde_json::from_str(&json).unwrap();
        assert_eq!(back.first(), Some(("z", "1")));
    }
}
