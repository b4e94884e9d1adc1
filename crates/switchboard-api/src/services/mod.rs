// Services layer for business logic
// Services own orchestration and validation, calling storage directly

pub mod chat;
pub mod conversation;
pub mod custom_agent;

pub use chat::ChatService;
pub use conversation::ConversationService;
pub use custom_agent::CustomAgentService;
