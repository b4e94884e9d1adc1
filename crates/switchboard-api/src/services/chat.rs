// Chat service: one agent turn per user message
//
// Builds a runner over the Postgres-backed stores and the gateway client;
// the runner owns persistence of everything the turn produces, including
// its own error messages.

use std::sync::Arc;

use switchboard_core::{
    AgentKind, AgentRunner, Message, OrchestratorError, Result, RunnerConfig, TurnInput,
};
use switchboard_gateway::GatewayClient;
use switchboard_storage::{Conversation, Database, PgDirectory, PgMessageStore, PgTraceSink};

pub struct ChatService {
    gateway: Arc<GatewayClient>,
    store: Arc<PgMessageStore>,
    traces: Arc<PgTraceSink>,
    directory: Arc<PgDirectory>,
    config: RunnerConfig,
}

impl ChatService {
    pub fn new(db: Database, gateway: Arc<GatewayClient>, config: RunnerConfig) -> Self {
        Self {
            gateway,
            store: Arc::new(PgMessageStore::new(db.clone())),
            traces: Arc::new(PgTraceSink::new(db.clone())),
            directory: Arc::new(PgDirectory::new(db)),
            config,
        }
    }

    /// Run one turn against the conversation's agent. The returned reply is
    /// already persisted; a failed turn comes back as an error message, not
    /// an Err.
    pub async fn send(&self, conversation: &Conversation, turn: TurnInput) -> Result<Message> {
        let agent = AgentKind::parse(&conversation.agent_type)
            .ok_or_else(|| OrchestratorError::UnknownAgent(conversation.agent_type.clone()))?;

        // The gateway fronts both completion and tool execution.
        let runner = AgentRunner::new(
            agent,
            self.config.clone(),
            conversation.id,
            self.gateway.clone(),
            self.gateway.clone(),
            self.store.clone(),
            self.traces.clone(),
            self.directory.clone(),
        );

        Ok(runner.run(turn).await)
    }
}
