//! Finish node: closes the run.

use async_trait::async_trait;
use flowmcp_core::{
    ChatMessage, ConversationStatus, DEFAULT_ACTION, FinishProperties, FlowNode, SharedState,
    Successors,
};

use super::{NodeLifecycle, RunContext, trace_entry};
use crate::error::FlowError;

pub struct FinishNode<'a> {
    node: &'a FlowNode,
    props: &'a FinishProperties,
}

impl<'a> FinishNode<'a> {
    pub const fn new(node: &'a FlowNode, props: &'a FinishProperties) -> Self {
        Self { node, props }
    }
}

#[async_trait]
impl NodeLifecycle for FinishNode<'_> {
    type Prepared = Option<String>;
    type Output = ();

    async fn prepare(
        &self,
        _state: &SharedState,
        ctx: &RunContext<'_>,
    ) -> Result<Option<String>, FlowError> {
        self.props
            .message
            .as_deref()
            .map(|t| ctx.renderer.render(t, ctx.vars))
            .transpose()
    }

    async fn execute(
        &self,
        _prepared: &Option<String>,
        _ctx: &RunContext<'_>,
    ) -> Result<(), FlowError> {
        Ok(())
    }

    fn finalize(
        &self,
        message: Option<String>,
        (): (),
        state: &mut SharedState,
        _successors: &Successors,
    ) -> String {
        let closing = message.filter(|m| !m.trim().is_empty());
        let has_message = closing.is_some();
        if let Some(text) = closing {
            state.push_message(ChatMessage::assistant(text));
        }
        state.status = ConversationStatus::Completed;

        state.record_trace(
            trace_entry(self.node, DEFAULT_ACTION).with_detail("closingMessage", has_message),
        );
        DEFAULT_ACTION.to_string()
    }
}
