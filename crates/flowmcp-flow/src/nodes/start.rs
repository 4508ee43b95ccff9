//! Start node: seeds the system prompt and the opening user turn.

use async_trait::async_trait;
use flowmcp_core::{
    ChatMessage, DEFAULT_ACTION, FlowNode, SharedState, StartProperties, Successors,
};

use super::{NodeLifecycle, RunContext, trace_entry};
use crate::error::FlowError;
use crate::template::DEFAULT_PROMPT_TEMPLATE;

pub struct StartNode<'a> {
    node: &'a FlowNode,
    props: &'a StartProperties,
}

impl<'a> StartNode<'a> {
    pub const fn new(node: &'a FlowNode, props: &'a StartProperties) -> Self {
        Self { node, props }
    }
}

pub struct SeededPrompt {
    system_prompt: Option<String>,
    user_message: String,
}

#[async_trait]
impl NodeLifecycle for StartNode<'_> {
    type Prepared = SeededPrompt;
    type Output = ();

    async fn prepare(
        &self,
        _state: &SharedState,
        ctx: &RunContext<'_>,
    ) -> Result<SeededPrompt, FlowError> {
        let system_prompt = self
            .props
            .system_prompt
            .as_deref()
            .map(|t| ctx.renderer.render(t, ctx.vars))
            .transpose()?;
        let template = self
            .props
            .prompt_template
            .as_deref()
            .unwrap_or(DEFAULT_PROMPT_TEMPLATE);
        let user_message = ctx.renderer.render(template, ctx.vars)?;

        Ok(SeededPrompt {
            system_prompt,
            user_message,
        })
    }

    async fn execute(&self, _prepared: &SeededPrompt, _ctx: &RunContext<'_>) -> Result<(), FlowError> {
        Ok(())
    }

    fn finalize(
        &self,
        prepared: SeededPrompt,
        (): (),
        state: &mut SharedState,
        successors: &Successors,
    ) -> String {
        if let Some(prompt) = prepared.system_prompt {
            state.system_prompt = Some(prompt);
        }
        let seeded = !prepared.user_message.trim().is_empty();
        if seeded {
            state.push_message(ChatMessage::user(prepared.user_message));
        }

        // The start node always takes its first edge.
        let action = successors
            .first()
            .map_or(DEFAULT_ACTION, |(action, _)| action)
            .to_string();

        state.record_trace(
            trace_entry(self.node, &action)
                .with_detail("seededMessages", u64::from(seeded))
                .with_detail("hasSystemPrompt", state.system_prompt.is_some()),
        );
        action
    }
}
