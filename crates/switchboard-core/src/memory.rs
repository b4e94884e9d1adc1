// In-memory backends
//
// Map-backed implementations of the storage seams. The worker and API crates
// run against Postgres in production; these exist for tests and for running
// the orchestrator without a database. Semantics mirror the Postgres
// implementations: updates to missing rows fail, credit deduction is
// all-or-nothing under a single lock.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::agents::CustomAgentProfile;
use crate::automation::{ActionStatus, AutomationAction, AutomationSession};
use crate::error::{OrchestratorError, Result};
use crate::message::Message;
use crate::trace::TraceRecord;
use crate::traits::{
    AgentDirectory, AutomationStore, MessageStore, ToolSummary, TraceSink,
};

/// Message store keyed by conversation
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<HashMap<Uuid, Vec<Message>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn store_message(&self, conversation_id: Uuid, message: &Message) -> Result<()> {
        let mut messages = self.messages.write().await;
        messages
            .entry(conversation_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let messages = self.messages.read().await;
        Ok(messages.get(&conversation_id).cloned().unwrap_or_default())
    }
}

/// Trace sink that keeps every record it is handed
#[derive(Default)]
pub struct InMemoryTraceSink {
    records: RwLock<Vec<TraceRecord>>,
}

impl InMemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<TraceRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl TraceSink for InMemoryTraceSink {
    async fn record_trace(&self, record: TraceRecord) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }
}

/// Directory of custom agents and tools
#[derive(Default)]
pub struct InMemoryDirectory {
    custom_agents: RwLock<HashMap<Uuid, CustomAgentProfile>>,
    tools: RwLock<Vec<ToolSummary>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_custom_agent(&self, profile: CustomAgentProfile) {
        self.custom_agents.write().await.insert(profile.id, profile);
    }

    pub async fn set_tools(&self, tools: Vec<ToolSummary>) {
        *self.tools.write().await = tools;
    }
}

#[async_trait]
impl AgentDirectory for InMemoryDirectory {
    async fn find_custom_agent(&self, id: Uuid) -> Result<Option<CustomAgentProfile>> {
        Ok(self.custom_agents.read().await.get(&id).cloned())
    }

    async fn available_tools(&self) -> Result<Vec<ToolSummary>> {
        Ok(self.tools.read().await.clone())
    }
}

/// Automation store with a credit ledger
#[derive(Default)]
pub struct InMemoryAutomationStore {
    sessions: RwLock<HashMap<Uuid, AutomationSession>>,
    actions: RwLock<HashMap<Uuid, AutomationAction>>,
    credits: RwLock<HashMap<Uuid, f64>>,
}

impl InMemoryAutomationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_credits(&self, user_id: Uuid, amount: f64) {
        self.credits.write().await.insert(user_id, amount);
    }
}

#[async_trait]
impl AutomationStore for InMemoryAutomationStore {
    async fn create_session(&self, session: &AutomationSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<AutomationSession>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn update_session(&self, session: &AutomationSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(&session.id) {
            return Err(OrchestratorError::store(format!(
                "session {} not found",
                session.id
            )));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn active_sessions(&self) -> Result<Vec<AutomationSession>> {
        let sessions = self.sessions.read().await;
        let mut active: Vec<_> = sessions
            .values()
            .filter(|s| s.status.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|s| (s.created_at, s.id));
        Ok(active)
    }

    async fn insert_action(&self, action: &AutomationAction) -> Result<()> {
        let mut actions = self.actions.write().await;
        actions.insert(action.id, action.clone());
        Ok(())
    }

    async fn update_action(&self, action: &AutomationAction) -> Result<()> {
        let mut actions = self.actions.write().await;
        if !actions.contains_key(&action.id) {
            return Err(OrchestratorError::store(format!(
                "action {} not found",
                action.id
            )));
        }
        actions.insert(action.id, action.clone());
        Ok(())
    }

    async fn session_actions(&self, session_id: Uuid) -> Result<Vec<AutomationAction>> {
        let actions = self.actions.read().await;
        let mut found: Vec<_> = actions
            .values()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.created_at, a.id));
        Ok(found)
    }

    async fn pending_action(&self, session_id: Uuid) -> Result<Option<AutomationAction>> {
        let actions = self.actions.read().await;
        Ok(actions
            .values()
            .filter(|a| a.session_id == session_id && a.status == ActionStatus::Pending)
            .min_by_key(|a| (a.created_at, a.id))
            .cloned())
    }

    async fn user_credits(&self, user_id: Uuid) -> Result<f64> {
        Ok(self.credits.read().await.get(&user_id).copied().unwrap_or(0.0))
    }

    async fn deduct_credits(&self, user_id: Uuid, amount: f64) -> Result<bool> {
        let mut credits = self.credits.write().await;
        let balance = credits.entry(user_id).or_insert(0.0);
        if *balance < amount {
            return Ok(false);
        }
        *balance -= amount;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_messages_round_trip() {
        let store = InMemoryMessageStore::new();
        let conversation = Uuid::now_v7();
        store
            .store_message(conversation, &Message::user("hello"))
            .await
            .unwrap();
        store
            .store_message(conversation, &Message::assistant("main", "hi"))
            .await
            .unwrap();

        let messages = store.list_messages(conversation).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hello");
    }

    #[tokio::test]
    async fn test_deduct_credits_is_all_or_nothing() {
        let store = InMemoryAutomationStore::new();
        let user = Uuid::now_v7();
        store.set_credits(user, 1.5).await;

        assert!(store.deduct_credits(user, 1.0).await.unwrap());
        assert!(!store.deduct_credits(user, 1.0).await.unwrap());
        // The failed deduction left the balance alone.
        assert_eq!(store.user_credits(user).await.unwrap(), 0.5);
    }

    #[tokio::test]
    async fn test_pending_action_is_head_of_queue() {
        let store = InMemoryAutomationStore::new();
        let session_id = Uuid::now_v7();

        let first = AutomationAction::new(session_id, "click", json!({}));
        let second = AutomationAction::new(session_id, "type", json!({}));
        store.insert_action(&first).await.unwrap();
        store.insert_action(&second).await.unwrap();

        let pending = store.pending_action(session_id).await.unwrap().unwrap();
        assert_eq!(pending.id, first.id);
    }

    #[tokio::test]
    async fn test_active_sessions_excludes_terminal() {
        let store = InMemoryAutomationStore::new();
        let user = Uuid::now_v7();

        let running = AutomationSession::new(user, "a");
        let mut stopped = AutomationSession::new(user, "b");
        stopped.transition_to(crate::automation::SessionStatus::Running).unwrap();
        stopped.transition_to(crate::automation::SessionStatus::Stopped).unwrap();

        store.create_session(&running).await.unwrap();
        store.create_session(&stopped).await.unwrap();

        let active = store.active_sessions().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, running.id);
    }

    #[tokio::test]
    async fn test_update_missing_session_fails() {
        let store = InMemoryAutomationStore::new();
        let session = AutomationSession::new(Uuid::now_v7(), "a");
        assert!(store.update_session(&session).await.is_err());
    }
}
