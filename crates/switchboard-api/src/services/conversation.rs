// Conversation service for business logic

use anyhow::Result;
use switchboard_core::Message;
use switchboard_storage::{Conversation, Database};
use uuid::Uuid;

pub struct ConversationService {
    db: Database,
}

impl ConversationService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        agent_type: &str,
        title: Option<&str>,
    ) -> Result<Conversation> {
        self.db.create_conversation(user_id, agent_type, title).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.db.get_conversation(id).await
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        self.db.list_conversations(user_id).await
    }

    pub async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        self.db.delete_conversation(id, user_id).await
    }

    pub async fn messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let rows = self.db.list_messages(conversation_id).await?;
        rows.into_iter()
            .map(|row| Ok(row.into_message()?))
            .collect()
    }
}
