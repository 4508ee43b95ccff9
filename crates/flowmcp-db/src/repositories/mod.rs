//! JSON file repository implementations.

mod json_conversation_repository;
mod json_flow_repository;
mod json_server_config_repository;

pub use json_conversation_repository::JsonConversationRepository;
pub use json_flow_repository::JsonFlowRepository;
pub use json_server_config_repository::JsonServerConfigRepository;
