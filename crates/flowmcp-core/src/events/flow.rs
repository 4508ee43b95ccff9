//! Flow execution event constructors.

use chrono::Utc;

use super::AppEvent;
use crate::domain::{ConversationStatus, NodeType};

impl AppEvent {
    pub fn flow_node_executed(
        conversation_id: &str,
        flow_id: &str,
        node_id: &str,
        node_type: NodeType,
        action: &str,
    ) -> Self {
        Self::FlowNodeExecuted {
            conversation_id: conversation_id.to_string(),
            flow_id: flow_id.to_string(),
            node_id: node_id.to_string(),
            node_type,
            action: action.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn flow_run_completed(
        conversation_id: &str,
        flow_id: &str,
        status: ConversationStatus,
        steps: usize,
    ) -> Self {
        Self::FlowRunCompleted {
            conversation_id: conversation_id.to_string(),
            flow_id: flow_id.to_string(),
            status,
            steps,
            timestamp: Utc::now(),
        }
    }
}
