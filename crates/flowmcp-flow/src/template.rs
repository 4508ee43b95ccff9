//! Prompt rendering.
//!
//! Start and process prompts are Handlebars templates rendered against the
//! run variables: `user_input`, `conversation_id`, `flow_id`, `title` and
//! any caller-supplied extras. Output is not HTML-escaped and missing fields
//! render as empty strings.

use std::collections::BTreeMap;

use handlebars::Handlebars;
use serde_json::{Map, Value};

use crate::error::FlowError;

/// Default opening user message when a start node has no template.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "{{user_input}}";

pub struct PromptRenderer {
    registry: Handlebars<'static>,
}

impl PromptRenderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        Self { registry }
    }

    pub fn render(&self, template: &str, vars: &RunVariables) -> Result<String, FlowError> {
        self.registry
            .render_template(template, &vars.to_value())
            .map_err(|e| FlowError::configuration(format!("template error: {e}")))
    }
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Variables visible to prompt templates during one run.
#[derive(Debug, Clone, Default)]
pub struct RunVariables {
    pub user_input: String,
    pub conversation_id: String,
    pub flow_id: String,
    pub title: String,
    pub extra: BTreeMap<String, String>,
}

impl RunVariables {
    fn to_value(&self) -> Value {
        let mut map: Map<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        map.insert("user_input".into(), self.user_input.clone().into());
        map.insert("conversation_id".into(), self.conversation_id.clone().into());
        map.insert("flow_id".into(), self.flow_id.clone().into());
        map.insert("title".into(), self.title.clone().into());
        Value::Object(map)
    }
}
