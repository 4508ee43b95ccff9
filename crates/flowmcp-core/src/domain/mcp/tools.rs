//! Tool namespacing and allow-list filtering.
//!
//! Tools surfaced to a model are renamed `tool:<server>:<originalName>` so
//! several servers can expose tools with the same name.

use serde::{Deserialize, Serialize};

use super::types::ToolDescriptor;

const TOOL_PREFIX: &str = "tool";

/// A tool as surfaced to a flow node / model, with its namespaced name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedTool {
    /// `tool:<server>:<originalName>`
    pub name: String,
    pub original_name: String,
    pub server_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

impl NamespacedTool {
    pub fn new(server_name: &str, tool: &ToolDescriptor) -> Self {
        Self {
            name: namespaced_tool_name(server_name, &tool.name),
            original_name: tool.name.clone(),
            server_name: server_name.to_string(),
            description: tool.description.clone(),
            input_schema: tool.input_schema.clone(),
        }
    }
}

/// Build `tool:<server>:<tool>`.
pub fn namespaced_tool_name(server_name: &str, tool_name: &str) -> String {
    format!("{TOOL_PREFIX}:{server_name}:{tool_name}")
}

/// Split a namespaced name back into `(server, tool)`.
///
/// Server names cannot contain `:`, tool names may.
pub fn parse_namespaced_tool_name(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix(TOOL_PREFIX)?.strip_prefix(':')?;
    let (server, tool) = rest.split_once(':')?;
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server, tool))
}

/// Apply a node's allow-list to a server's tools and namespace the survivors.
///
/// An empty allow-list means no restriction: every discovered tool is surfaced.
pub fn filter_enabled_tools(
    server_name: &str,
    tools: &[ToolDescriptor],
    enabled_tools: &[String],
) -> Vec<NamespacedTool> {
    tools
        .iter()
        .filter(|t| enabled_tools.is_empty() || enabled_tools.iter().any(|e| e == &t.name))
        .map(|t| NamespacedTool::new(server_name, t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc_tools() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new("add"),
            ToolDescriptor::new("subtract"),
            ToolDescriptor::new("multiply").with_description("a * b"),
        ]
    }

    #[test]
    fn test_allow_list_restricts_tools() {
        let surfaced = filter_enabled_tools("calc", &calc_tools(), &["add".to_string()]);
        assert_eq!(surfaced.len(), 1);
        assert_eq!(surfaced[0].name, "tool:calc:add");
        assert_eq!(surfaced[0].original_name, "add");
        assert_eq!(surfaced[0].server_name, "calc");
    }

    #[test]
    fn test_empty_allow_list_surfaces_everything() {
        let surfaced = filter_enabled_tools("calc", &calc_tools(), &[]);
        let names: Vec<_> = surfaced.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["tool:calc:add", "tool:calc:subtract", "tool:calc:multiply"]
        );
    }

    #[test]
    fn test_unknown_allow_list_entries_are_ignored() {
        let surfaced = filter_enabled_tools("calc", &calc_tools(), &["divide".to_string()]);
        assert!(surfaced.is_empty());
    }

    #[test]
    fn test_parse_namespaced_name() {
        assert_eq!(
            parse_namespaced_tool_name("tool:calc:add"),
            Some(("calc", "add"))
        );
        assert_eq!(
            parse_namespaced_tool_name("tool:fs:read:file"),
            Some(("fs", "read:file"))
        );
        assert_eq!(parse_namespaced_tool_name("calc:add"), None);
        assert_eq!(parse_namespaced_tool_name("tool::add"), None);
        assert_eq!(parse_namespaced_tool_name("tools:calc:add"), None);
    }
}
