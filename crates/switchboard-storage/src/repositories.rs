// Repository layer for database operations
//
// All SQL lives here, on a single Database handle. The trait adapters
// (message_store, trace_sink, directory, automation_store) call these
// methods and translate errors into the core taxonomy.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use switchboard_core::automation::{AutomationAction, AutomationSession};

use crate::models::*;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Apply pending migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ============================================
    // Conversations
    // ============================================

    pub async fn create_conversation(
        &self,
        user_id: Uuid,
        agent_type: &str,
        title: Option<&str>,
    ) -> Result<Conversation> {
        let row = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (id, user_id, title, agent_type)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, title, agent_type, created_at, updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(title)
        .bind(agent_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let row = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, user_id, title, agent_type, created_at, updated_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, user_id, title, agent_type, created_at, updated_at
            FROM conversations
            WHERE user_id = $1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn touch_conversation(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE conversations SET updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete_conversation(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ============================================
    // Messages
    // ============================================

    pub async fn create_message(&self, input: CreateMessageRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, agent_type, status, command, tasks, handoff_request, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(input.id)
        .bind(input.conversation_id)
        .bind(&input.role)
        .bind(&input.content)
        .bind(&input.agent_type)
        .bind(&input.status)
        .bind(&input.command)
        .bind(&input.tasks)
        .bind(&input.handoff_request)
        .bind(input.created_at)
        .execute(&self.pool)
        .await?;

        self.touch_conversation(input.conversation_id).await?;

        Ok(())
    }

    pub async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<MessageRow>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, role, content, agent_type, status, command, tasks, handoff_request, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ============================================
    // Custom agents
    // ============================================

    pub async fn create_custom_agent(&self, input: CreateCustomAgent) -> Result<CustomAgentRecord> {
        let row = sqlx::query_as::<_, CustomAgentRecord>(
            r#"
            INSERT INTO custom_agents (id, user_id, name, description, instructions)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, name, description, instructions, created_at, updated_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.user_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.instructions)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_custom_agent(&self, id: Uuid) -> Result<Option<CustomAgentRecord>> {
        let row = sqlx::query_as::<_, CustomAgentRecord>(
            r#"
            SELECT id, user_id, name, description, instructions, created_at, updated_at
            FROM custom_agents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_custom_agents(&self, user_id: Uuid) -> Result<Vec<CustomAgentRecord>> {
        let rows = sqlx::query_as::<_, CustomAgentRecord>(
            r#"
            SELECT id, user_id, name, description, instructions, created_at, updated_at
            FROM custom_agents
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn update_custom_agent(
        &self,
        id: Uuid,
        user_id: Uuid,
        input: UpdateCustomAgent,
    ) -> Result<Option<CustomAgentRecord>> {
        let row = sqlx::query_as::<_, CustomAgentRecord>(
            r#"
            UPDATE custom_agents
            SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                instructions = COALESCE($5, instructions),
                updated_at = now()
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, name, description, instructions, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.instructions)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn delete_custom_agent(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM custom_agents WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ============================================
    // Tools
    // ============================================

    pub async fn list_enabled_tools(&self) -> Result<Vec<ToolRow>> {
        let rows = sqlx::query_as::<_, ToolRow>(
            r#"
            SELECT name, description, required_credits, parameters
            FROM tools
            WHERE enabled
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ============================================
    // Traces
    // ============================================

    pub async fn insert_trace(&self, input: CreateTraceRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_traces (trace_id, run_id, conversation_id, user_id, agent_type, model_used,
                                      user_message, assistant_response, has_attachments, events, messages,
                                      started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (trace_id) DO NOTHING
            "#,
        )
        .bind(input.trace_id)
        .bind(input.run_id)
        .bind(input.conversation_id)
        .bind(input.user_id)
        .bind(&input.agent_type)
        .bind(&input.model_used)
        .bind(&input.user_message)
        .bind(&input.assistant_response)
        .bind(input.has_attachments)
        .bind(&input.events)
        .bind(&input.messages)
        .bind(input.started_at)
        .bind(input.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ============================================
    // Credits
    // ============================================

    pub async fn get_user_credits(&self, user_id: Uuid) -> Result<f64> {
        let credits: Option<f64> =
            sqlx::query_scalar("SELECT credits_remaining FROM user_credits WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(credits.unwrap_or(0.0))
    }

    pub async fn set_user_credits(&self, user_id: Uuid, credits: f64) -> Result<f64> {
        let credits: f64 = sqlx::query_scalar(
            r#"
            INSERT INTO user_credits (user_id, credits_remaining)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET credits_remaining = $2, updated_at = now()
            RETURNING credits_remaining
            "#,
        )
        .bind(user_id)
        .bind(credits)
        .fetch_one(&self.pool)
        .await?;

        Ok(credits)
    }

    /// Atomically deduct credits; returns false when the balance is too low
    pub async fn try_deduct_credits(&self, user_id: Uuid, amount: f64) -> Result<bool> {
        let deducted: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE user_credits
            SET credits_remaining = credits_remaining - $2, updated_at = now()
            WHERE user_id = $1 AND credits_remaining >= $2
            RETURNING user_id
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(deducted.is_some())
    }

    // ============================================
    // Automation sessions
    // ============================================

    pub async fn insert_automation_session(&self, session: &AutomationSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO automation_sessions (id, user_id, instructions, status, provider_task_id, live_url,
                                             current_url, progress, output, media_urls, screenshot, error,
                                             created_at, updated_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.instructions)
        .bind(session.status.to_string())
        .bind(&session.provider_task_id)
        .bind(&session.live_url)
        .bind(&session.current_url)
        .bind(session.progress)
        .bind(&session.output)
        .bind(serde_json::to_value(&session.media_urls)?)
        .bind(&session.screenshot)
        .bind(&session.error)
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(session.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_automation_session(&self, id: Uuid) -> Result<Option<SessionRow>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, instructions, status, provider_task_id, live_url, current_url, progress,
                   output, media_urls, screenshot, error, created_at, updated_at, finished_at
            FROM automation_sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn update_automation_session(&self, session: &AutomationSession) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE automation_sessions
            SET
                status = $2,
                provider_task_id = $3,
                live_url = $4,
                current_url = $5,
                progress = $6,
                output = $7,
                media_urls = $8,
                screenshot = $9,
                error = $10,
                updated_at = $11,
                finished_at = $12
            WHERE id = $1
            "#,
        )
        .bind(session.id)
        .bind(session.status.to_string())
        .bind(&session.provider_task_id)
        .bind(&session.live_url)
        .bind(&session.current_url)
        .bind(session.progress)
        .bind(&session.output)
        .bind(serde_json::to_value(&session.media_urls)?)
        .bind(&session.screenshot)
        .bind(&session.error)
        .bind(session.updated_at)
        .bind(session.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn list_active_sessions(&self) -> Result<Vec<SessionRow>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, instructions, status, provider_task_id, live_url, current_url, progress,
                   output, media_urls, screenshot, error, created_at, updated_at, finished_at
            FROM automation_sessions
            WHERE status IN ('pending', 'running', 'paused')
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn list_user_sessions(&self, user_id: Uuid) -> Result<Vec<SessionRow>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, instructions, status, provider_task_id, live_url, current_url, progress,
                   output, media_urls, screenshot, error, created_at, updated_at, finished_at
            FROM automation_sessions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ============================================
    // Automation actions
    // ============================================

    pub async fn insert_automation_action(&self, action: &AutomationAction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO automation_actions (id, session_id, action_type, action_details, status, attempts,
                                            screenshot_url, error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(action.id)
        .bind(action.session_id)
        .bind(&action.action_type)
        .bind(&action.action_details)
        .bind(action.status.to_string())
        .bind(action.attempts as i32)
        .bind(&action.screenshot_url)
        .bind(&action.error)
        .bind(action.created_at)
        .bind(action.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_automation_action(&self, action: &AutomationAction) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE automation_actions
            SET status = $2, attempts = $3, screenshot_url = $4, error = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(action.id)
        .bind(action.status.to_string())
        .bind(action.attempts as i32)
        .bind(&action.screenshot_url)
        .bind(&action.error)
        .bind(action.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn list_session_actions(&self, session_id: Uuid) -> Result<Vec<ActionRow>> {
        let rows = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT id, session_id, action_type, action_details, status, attempts, screenshot_url, error,
                   created_at, updated_at
            FROM automation_actions
            WHERE session_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn next_pending_action(&self, session_id: Uuid) -> Result<Option<ActionRow>> {
        let row = sqlx::query_as::<_, ActionRow>(
            r#"
            SELECT id, session_id, action_type, action_details, status, attempts, screenshot_url, error,
                   created_at, updated_at
            FROM automation_actions
            WHERE session_id = $1 AND status = 'pending'
            ORDER BY created_at, id
            LIMIT 1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
