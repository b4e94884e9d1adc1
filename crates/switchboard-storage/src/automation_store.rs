// Database-backed AutomationStore implementation
//
// Sessions and their action queues, plus the credit ledger. Updates that
// match no row are surfaced as store errors rather than silently doing
// nothing; the worker relies on that to notice a session it believes it
// owns has disappeared.

use async_trait::async_trait;
use uuid::Uuid;

use switchboard_core::automation::{AutomationAction, AutomationSession};
use switchboard_core::error::{OrchestratorError, Result};
use switchboard_core::traits::AutomationStore;

use crate::models::ActionRow;
use crate::repositories::Database;

/// Database-backed automation store
#[derive(Clone)]
pub struct PgAutomationStore {
    db: Database,
}

impl PgAutomationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn store_err(e: anyhow::Error) -> OrchestratorError {
    OrchestratorError::store(e.to_string())
}

#[async_trait]
impl AutomationStore for PgAutomationStore {
    async fn create_session(&self, session: &AutomationSession) -> Result<()> {
        self.db
            .insert_automation_session(session)
            .await
            .map_err(store_err)
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<AutomationSession>> {
        let row = self
            .db
            .get_automation_session(id)
            .await
            .map_err(store_err)?;

        row.map(|r| r.into_session()).transpose()
    }

    async fn update_session(&self, session: &AutomationSession) -> Result<()> {
        let affected = self
            .db
            .update_automation_session(session)
            .await
            .map_err(store_err)?;

        if affected == 0 {
            return Err(OrchestratorError::store(format!(
                "automation session {} not found",
                session.id
            )));
        }

        Ok(())
    }

    async fn active_sessions(&self) -> Result<Vec<AutomationSession>> {
        let rows = self.db.list_active_sessions().await.map_err(store_err)?;

        rows.into_iter().map(|r| r.into_session()).collect()
    }

    async fn insert_action(&self, action: &AutomationAction) -> Result<()> {
        self.db
            .insert_automation_action(action)
            .await
            .map_err(store_err)
    }

    async fn update_action(&self, action: &AutomationAction) -> Result<()> {
        let affected = self
            .db
            .update_automation_action(action)
            .await
            .map_err(store_err)?;

        if affected == 0 {
            return Err(OrchestratorError::store(format!(
                "automation action {} not found",
                action.id
            )));
        }

        Ok(())
    }

    async fn session_actions(&self, session_id: Uuid) -> Result<Vec<AutomationAction>> {
        let rows = self
            .db
            .list_session_actions(session_id)
            .await
            .map_err(store_err)?;

        Ok(rows.into_iter().map(AutomationAction::from).collect())
    }

    async fn pending_action(&self, session_id: Uuid) -> Result<Option<AutomationAction>> {
        let row = self
            .db
            .next_pending_action(session_id)
            .await
            .map_err(store_err)?;

        Ok(row.map(AutomationAction::from))
    }

    async fn user_credits(&self, user_id: Uuid) -> Result<f64> {
        self.db.get_user_credits(user_id).await.map_err(store_err)
    }

    async fn deduct_credits(&self, user_id: Uuid, amount: f64) -> Result<bool> {
        self.db
            .try_deduct_credits(user_id, amount)
            .await
            .map_err(store_err)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use switchboard_core::automation::ActionStatus;

    use super::*;

    #[test]
    fn test_action_row_conversion_preserves_queue_order_fields() {
        let now = Utc::now();
        let row = ActionRow {
            id: Uuid::now_v7(),
            session_id: Uuid::now_v7(),
            action_type: "click".to_string(),
            action_details: json!({"selector": "#submit"}),
            status: "pending".to_string(),
            attempts: 2,
            screenshot_url: None,
            error: None,
            created_at: now,
            updated_at: now,
        };

        let action = AutomationAction::from(row.clone());
        assert_eq!(action.id, row.id);
        assert_eq!(action.status, ActionStatus::Pending);
        assert_eq!(action.attempts, 2);
        assert_eq!(action.action_details["selector"], "#submit");
    }
}
