// Database-backed AgentDirectory implementation
//
// Serves handoff-target validation (custom agent lookup by id) and the
// tool catalog offered to the tool agent. Disabled tools are invisible.

use async_trait::async_trait;
use uuid::Uuid;

use switchboard_core::agents::CustomAgentProfile;
use switchboard_core::error::{OrchestratorError, Result};
use switchboard_core::traits::{AgentDirectory, ToolSummary};

use crate::repositories::Database;

/// Database-backed agent and tool directory
#[derive(Clone)]
pub struct PgDirectory {
    db: Database,
}

impl PgDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AgentDirectory for PgDirectory {
    async fn find_custom_agent(&self, id: Uuid) -> Result<Option<CustomAgentProfile>> {
        let record = self
            .db
            .get_custom_agent(id)
            .await
            .map_err(|e| OrchestratorError::data(e.to_string()))?;

        Ok(record.map(CustomAgentProfile::from))
    }

    async fn available_tools(&self) -> Result<Vec<ToolSummary>> {
        let rows = self
            .db
            .list_enabled_tools()
            .await
            .map_err(|e| OrchestratorError::data(e.to_string()))?;

        Ok(rows.into_iter().map(ToolSummary::from).collect())
    }
}
