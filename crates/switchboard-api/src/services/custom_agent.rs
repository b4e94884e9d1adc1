// Custom agent service for business logic

use anyhow::Result;
use switchboard_core::CustomAgentProfile;
use switchboard_storage::{CreateCustomAgent, Database, UpdateCustomAgent};
use uuid::Uuid;

pub struct CustomAgentService {
    db: Database,
}

impl CustomAgentService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: CreateCustomAgent) -> Result<CustomAgentProfile> {
        let record = self.db.create_custom_agent(input).await?;
        Ok(CustomAgentProfile::from(record))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<CustomAgentProfile>> {
        Ok(self
            .db
            .get_custom_agent(id)
            .await?
            .map(CustomAgentProfile::from))
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<CustomAgentProfile>> {
        let records = self.db.list_custom_agents(user_id).await?;
        Ok(records.into_iter().map(CustomAgentProfile::from).collect())
    }

    pub async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        input: UpdateCustomAgent,
    ) -> Result<Option<CustomAgentProfile>> {
        Ok(self
            .db
            .update_custom_agent(id, user_id, input)
            .await?
            .map(CustomAgentProfile::from))
    }

    pub async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        self.db.delete_custom_agent(id, user_id).await
    }
}
