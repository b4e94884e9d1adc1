// Database-backed MessageStore implementation
//
// Persists every message the runner produces, keyed by conversation, and
// rebuilds the core Message type on the way out. Inserting a message also
// bumps the parent conversation's updated_at so listings sort by activity.

use async_trait::async_trait;
use uuid::Uuid;

use switchboard_core::error::{OrchestratorError, Result};
use switchboard_core::message::Message;
use switchboard_core::traits::MessageStore;

use crate::models::CreateMessageRow;
use crate::repositories::Database;

/// Database-backed message store
#[derive(Clone)]
pub struct PgMessageStore {
    db: Database,
}

impl PgMessageStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn store_message(&self, conversation_id: Uuid, message: &Message) -> Result<()> {
        let tasks = serde_json::to_value(&message.tasks)
            .map_err(|e| OrchestratorError::store(format!("unserializable tasks: {e}")))?;
        let handoff_request = message
            .handoff_request
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| OrchestratorError::store(format!("unserializable handoff: {e}")))?;

        let input = CreateMessageRow {
            id: message.id,
            conversation_id,
            role: message.role.to_string(),
            content: message.content.clone(),
            agent_type: message.agent_type.clone(),
            status: message.status.map(|s| s.to_string()),
            command: message.command.clone(),
            tasks,
            handoff_request,
            created_at: message.created_at,
        };

        self.db
            .create_message(input)
            .await
            .map_err(|e| OrchestratorError::store(e.to_string()))
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let rows = self
            .db
            .list_messages(conversation_id)
            .await
            .map_err(|e| OrchestratorError::store(e.to_string()))?;

        rows.into_iter().map(|row| row.into_message()).collect()
    }
}
