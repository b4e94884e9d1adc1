// Agent runner
//
// The entry point of the orchestration core. One runner fronts one agent in
// one conversation; run() takes the user's turn and always comes back with a
// Message, never an error. Completion responses are handled in a fixed
// priority order: a handoff outranks a tool call, which outranks a plain
// reply.
//
// Decision: a handoff delegates to a child runner that shares this runner's
// clients, trace and conversation. The chain of visited agents rides along
// with the delegation, so cycles and over-long chains are rejected before the
// doomed hop makes any completion call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::agents::AgentKind;
use crate::error::{OrchestratorError, Result};
use crate::handoff::{continuation_message, parse_handoff, HandoffChain, HandoffOrigin};
use crate::message::{format_attachments, Attachment, HandoffRequest, Message, MessageRole, Task};
use crate::retry::{retry_with, RetryPolicy};
use crate::tool_call::{parse_tool_call, ToolCall};
use crate::trace::{TraceEventKind, TraceRecorder};
use crate::traits::{
    AgentDirectory, CompletionClient, CompletionMessage, CompletionRequest, CompletionResponse,
    ContextData, MessageStore, ToolExecutor, ToolInvocation, TraceSink,
};

/// Handoffs allowed per run before the chain is cut off
pub const DEFAULT_MAX_HANDOFFS: usize = 5;

/// Tuning knobs for a runner. The defaults match production behavior.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Hop budget for a single run's handoff chain
    pub max_handoffs: usize,
    /// Ask the completion service for the larger model
    pub use_performance_model: bool,
    /// Execute tool-format replies from any agent, not just the tool agent
    pub direct_tool_execution: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_handoffs: DEFAULT_MAX_HANDOFFS,
            use_performance_model: false,
            direct_tool_execution: false,
        }
    }
}

/// Callback notified when a turn fails, before the failure becomes an
/// error Message
pub type ErrorHook = Arc<dyn Fn(&OrchestratorError) + Send + Sync>;

/// One user turn, as handed to [`AgentRunner::run`]
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub user_input: String,
    pub attachments: Vec<Attachment>,
    pub user_id: Uuid,
    /// Tool the user explicitly picked, forwarded as a hint
    pub requested_tool: Option<String>,
}

impl TurnInput {
    pub fn new(user_input: impl Into<String>, user_id: Uuid) -> Self {
        Self {
            user_input: user_input.into(),
            attachments: Vec::new(),
            user_id,
            requested_tool: None,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_requested_tool(mut self, tool: impl Into<String>) -> Self {
        self.requested_tool = Some(tool.into());
        self
    }
}

/// Runs one agent's side of a conversation
pub struct AgentRunner<C, T, M, S, D> {
    agent: AgentKind,
    config: RunnerConfig,
    conversation_id: Uuid,
    completion_retry: RetryPolicy,
    completions: Arc<C>,
    tools: Arc<T>,
    store: Arc<M>,
    traces: Arc<S>,
    directory: Arc<D>,
    on_error: Option<ErrorHook>,
}

impl<C, T, M, S, D> AgentRunner<C, T, M, S, D>
where
    C: CompletionClient,
    T: ToolExecutor,
    M: MessageStore,
    S: TraceSink,
    D: AgentDirectory,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent: AgentKind,
        config: RunnerConfig,
        conversation_id: Uuid,
        completions: Arc<C>,
        tools: Arc<T>,
        store: Arc<M>,
        traces: Arc<S>,
        directory: Arc<D>,
    ) -> Self {
        Self {
            agent,
            config,
            conversation_id,
            completion_retry: RetryPolicy::completion(),
            completions,
            tools,
            store,
            traces,
            directory,
            on_error: None,
        }
    }

    /// Report turn failures to `hook`, in addition to the error Message
    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.on_error = Some(hook);
        self
    }

    pub fn agent(&self) -> &AgentKind {
        &self.agent
    }

    /// Run one turn. Always produces a Message: failures come back as an
    /// error-status message, already persisted when the store allows it.
    pub async fn run(&self, turn: TurnInput) -> Message {
        let trace = Arc::new(TraceRecorder::new(
            self.conversation_id,
            turn.user_id,
            &self.agent,
        ));
        let chain = HandoffChain::new(self.agent.clone());
        self.run_inner(turn, trace, chain, None).await
    }

    async fn run_inner(
        &self,
        turn: TurnInput,
        trace: Arc<TraceRecorder>,
        chain: HandoffChain,
        origin: Option<HandoffOrigin>,
    ) -> Message {
        let is_root = origin.is_none();

        let message = match self.run_turn(&turn, &trace, &chain, origin.as_ref()).await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(agent = %self.agent, error = %e, "agent run failed");
                if let Some(hook) = &self.on_error {
                    hook(&e);
                }
                trace
                    .record(
                        TraceEventKind::Error,
                        json!({
                            "agent": self.agent.to_string(),
                            "error": e.to_string(),
                        }),
                    )
                    .await;

                let message = Message::error(self.agent.to_string(), format!("Error: {e}"));
                if let Err(store_err) = self
                    .store
                    .store_message(self.conversation_id, &message)
                    .await
                {
                    tracing::warn!(error = %store_err, "failed to store error message");
                }
                trace.record_message(&message).await;
                message
            }
        };

        // Only the run that opened the trace flushes it; delegated runs
        // append and leave persistence to the root.
        if is_root {
            trace.flush(self.traces.as_ref()).await;
        }
        message
    }

    /// Boxed indirection for the handoff recursion
    fn run_delegated<'a>(
        &'a self,
        turn: TurnInput,
        trace: Arc<TraceRecorder>,
        chain: HandoffChain,
        origin: HandoffOrigin,
    ) -> Pin<Box<dyn Future<Output = Message> + Send + 'a>> {
        Box::pin(self.run_inner(turn, trace, chain, Some(origin)))
    }

    async fn run_turn(
        &self,
        turn: &TurnInput,
        trace: &Arc<TraceRecorder>,
        chain: &HandoffChain,
        origin: Option<&HandoffOrigin>,
    ) -> Result<Message> {
        // The root run owns the user's message; a delegated run finds it in
        // the history the root already stored.
        if origin.is_none() {
            let user_message = self.build_user_message(turn);
            self.store
                .store_message(self.conversation_id, &user_message)
                .await?;
            trace.record_message(&user_message).await;
        }

        let history = self.store.list_messages(self.conversation_id).await?;
        let mut messages: Vec<CompletionMessage> =
            history.iter().map(CompletionMessage::from).collect();
        if origin.is_some() {
            messages.push(CompletionMessage {
                role: MessageRole::System.to_string(),
                content: continuation_message(&self.agent),
            });
        }

        let context_data = self.context_data(turn, trace, origin).await;
        let request = CompletionRequest {
            messages,
            agent_type: self.agent.to_string(),
            user_id: turn.user_id,
            context_data,
        };

        trace
            .record(
                TraceEventKind::ApiCall,
                json!({
                    "agent": self.agent.to_string(),
                    "message_count": request.messages.len(),
                    "has_attachments": !turn.attachments.is_empty(),
                }),
            )
            .await;

        let client = self.completions.clone();
        let response = retry_with(&self.completion_retry, "completion", move || {
            let client = client.clone();
            let request = request.clone();
            async move { client.complete(request).await }
        })
        .await?;

        if let Some(model) = &response.model_used {
            trace.set_model(model.clone()).await;
        }

        // Structured handoff wins; parsing the text is the fallback.
        let handoff: Option<HandoffRequest> = response
            .handoff_request
            .clone()
            .map(HandoffRequest::from)
            .or_else(|| parse_handoff(&response.completion));

        if let Some(handoff) = handoff {
            return self
                .handle_handoff(turn, trace, chain, handoff, &response)
                .await;
        }

        if self.agent == AgentKind::Tool || self.config.direct_tool_execution {
            if let Some(call) = parse_tool_call(&response.completion) {
                return self.handle_tool_call(turn, trace, call).await;
            }
        }

        let message = Message::assistant(self.agent.to_string(), response.completion.clone());
        self.store
            .store_message(self.conversation_id, &message)
            .await?;
        trace.record_message(&message).await;
        trace
            .record(
                TraceEventKind::Response,
                json!({
                    "agent": self.agent.to_string(),
                    "length": response.completion.len(),
                }),
            )
            .await;

        Ok(message)
    }

    async fn handle_handoff(
        &self,
        turn: &TurnInput,
        trace: &Arc<TraceRecorder>,
        chain: &HandoffChain,
        handoff: HandoffRequest,
        response: &CompletionResponse,
    ) -> Result<Message> {
        // The annotated message goes out before the target is validated, so
        // the conversation records the attempt even when it is rejected.
        let annotated = Message::assistant(self.agent.to_string(), response.completion.clone())
            .with_handoff(handoff.clone());
        self.store
            .store_message(self.conversation_id, &annotated)
            .await?;
        trace.record_message(&annotated).await;

        trace
            .record(
                TraceEventKind::HandoffStart,
                json!({
                    "from": self.agent.to_string(),
                    "to": handoff.target_agent,
                    "reason": handoff.reason,
                }),
            )
            .await;

        let target = self.validate_handoff_target(&handoff.target_agent).await?;
        let extended = chain.extended(target.clone(), self.config.max_handoffs)?;

        let child = self.child_for(target.clone());
        let origin = HandoffOrigin {
            from: self.agent.clone(),
            reason: handoff.reason.clone(),
            additional_context: handoff.additional_context.clone(),
        };
        let child_turn = TurnInput {
            user_input: turn.user_input.clone(),
            attachments: Vec::new(),
            user_id: turn.user_id,
            requested_tool: None,
        };

        let message = child
            .run_delegated(child_turn, trace.clone(), extended, origin)
            .await;

        trace
            .record(
                TraceEventKind::HandoffComplete,
                json!({
                    "from": self.agent.to_string(),
                    "to": target.to_string(),
                }),
            )
            .await;

        Ok(message)
    }

    /// Resolve a handoff target. Built-in names and existing custom agent
    /// UUIDs are valid; everything else is an unknown agent.
    async fn validate_handoff_target(&self, target: &str) -> Result<AgentKind> {
        let kind = AgentKind::parse(target)
            .ok_or_else(|| OrchestratorError::UnknownAgent(target.to_string()))?;

        if let AgentKind::Custom(id) = &kind {
            if self.directory.find_custom_agent(*id).await?.is_none() {
                return Err(OrchestratorError::UnknownAgent(target.to_string()));
            }
        }

        Ok(kind)
    }

    async fn handle_tool_call(
        &self,
        turn: &TurnInput,
        trace: &Arc<TraceRecorder>,
        call: ToolCall,
    ) -> Result<Message> {
        let mut task = Task::pending(call.name.clone());

        trace
            .record(
                TraceEventKind::ToolExecution,
                json!({
                    "tool": call.name,
                    "parameters": call.parameters,
                }),
            )
            .await;

        let invocation = ToolInvocation {
            tool_name: call.name.clone(),
            parameters: call.parameters.clone(),
            user_id: turn.user_id,
            trace_id: Some(trace.trace_id()),
        };

        // A failed execution is still a normal turn: the task and message
        // carry the failure, the run itself does not error.
        let message = match self.tools.execute(invocation).await {
            Ok(outcome) if outcome.success => {
                task.complete();
                Message::tool(self.agent.to_string(), outcome.message).with_tasks(vec![task])
            }
            Ok(outcome) => {
                task.fail(outcome.message.clone());
                trace
                    .record(
                        TraceEventKind::Error,
                        json!({ "tool": call.name, "error": outcome.message }),
                    )
                    .await;
                Message::error(self.agent.to_string(), format!("Error: {}", outcome.message))
                    .with_tasks(vec![task])
            }
            Err(e) => {
                task.fail(e.to_string());
                trace
                    .record(
                        TraceEventKind::Error,
                        json!({ "tool": call.name, "error": e.to_string() }),
                    )
                    .await;
                Message::error(self.agent.to_string(), format!("Error: {e}"))
                    .with_tasks(vec![task])
            }
        };

        self.store
            .store_message(self.conversation_id, &message)
            .await?;
        trace.record_message(&message).await;
        Ok(message)
    }

    fn build_user_message(&self, turn: &TurnInput) -> Message {
        let mut content = turn.user_input.clone();
        if !turn.attachments.is_empty() {
            let markers = format_attachments(&turn.attachments);
            if content.is_empty() {
                content = markers;
            } else {
                content = format!("{content}\n\n{markers}");
            }
        }
        Message::user(content)
    }

    async fn context_data(
        &self,
        turn: &TurnInput,
        trace: &TraceRecorder,
        origin: Option<&HandoffOrigin>,
    ) -> ContextData {
        // Only the tool agent needs the directory; a lookup failure degrades
        // to an empty list rather than failing the turn.
        let available_tools = if self.agent == AgentKind::Tool {
            match self.directory.available_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to load tool directory");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        ContextData {
            has_attachments: !turn.attachments.is_empty(),
            attachment_types: turn.attachments.iter().map(|a| a.kind.to_string()).collect(),
            is_custom_agent: self.agent.is_custom(),
            is_handoff_continuation: origin.is_some(),
            use_performance_model: self.config.use_performance_model,
            trace_id: Some(trace.trace_id()),
            requested_tool: turn.requested_tool.clone(),
            handoff_context: origin.and_then(|o| o.additional_context.clone()),
            available_tools,
        }
    }

    fn child_for(&self, agent: AgentKind) -> Self {
        Self {
            agent,
            config: self.config.clone(),
            conversation_id: self.conversation_id,
            completion_retry: self.completion_retry.clone(),
            completions: self.completions.clone(),
            tools: self.tools.clone(),
            store: self.store.clone(),
            traces: self.traces.clone(),
            directory: self.directory.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::CustomAgentProfile;
    use crate::memory::{InMemoryDirectory, InMemoryMessageStore, InMemoryTraceSink};
    use crate::message::AttachmentKind;
    use crate::traits::{HandoffDirective, ToolOutcome, ToolSummary};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    struct ScriptedCompletions {
        responses: Mutex<VecDeque<Result<CompletionResponse>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedCompletions {
        fn new(responses: Vec<Result<CompletionResponse>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn reply(text: &str) -> Result<CompletionResponse> {
            Ok(CompletionResponse {
                completion: text.to_string(),
                handoff_request: None,
                model_used: Some("gpt-4o-mini".to_string()),
            })
        }

        fn handoff(text: &str, target: &str, reason: &str) -> Result<CompletionResponse> {
            Ok(CompletionResponse {
                completion: text.to_string(),
                handoff_request: Some(HandoffDirective {
                    target_agent: target.to_string(),
                    reason: reason.to_string(),
                    additional_context: None,
                }),
                model_used: Some("gpt-4o-mini".to_string()),
            })
        }

        async fn call_count(&self) -> usize {
            self.requests.lock().await.len()
        }

        async fn request(&self, index: usize) -> CompletionRequest {
            self.requests.lock().await[index].clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedCompletions {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            self.requests.lock().await.push(request);
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(OrchestratorError::completion("no scripted response left")))
        }
    }

    struct ScriptedTools {
        outcomes: Mutex<VecDeque<Result<ToolOutcome>>>,
        invocations: Mutex<Vec<ToolInvocation>>,
    }

    impl ScriptedTools {
        fn new(outcomes: Vec<Result<ToolOutcome>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                invocations: Mutex::new(Vec::new()),
            }
        }

        async fn invocation_count(&self) -> usize {
            self.invocations.lock().await.len()
        }
    }

    #[async_trait]
    impl ToolExecutor for ScriptedTools {
        async fn execute(&self, invocation: ToolInvocation) -> Result<ToolOutcome> {
            self.invocations.lock().await.push(invocation);
            self.outcomes
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(OrchestratorError::tool("no scripted outcome left")))
        }
    }

    struct Harness {
        runner: AgentRunner<
            ScriptedCompletions,
            ScriptedTools,
            InMemoryMessageStore,
            InMemoryTraceSink,
            InMemoryDirectory,
        >,
        completions: Arc<ScriptedCompletions>,
        tools: Arc<ScriptedTools>,
        store: Arc<InMemoryMessageStore>,
        sink: Arc<InMemoryTraceSink>,
        directory: Arc<InMemoryDirectory>,
        conversation_id: Uuid,
        user_id: Uuid,
    }

    impl Harness {
        fn turn(&self, input: &str) -> TurnInput {
            TurnInput::new(input, self.user_id)
        }
    }

    fn harness(agent: AgentKind, responses: Vec<Result<CompletionResponse>>) -> Harness {
        harness_with(agent, RunnerConfig::default(), responses, Vec::new())
    }

    fn harness_with(
        agent: AgentKind,
        config: RunnerConfig,
        responses: Vec<Result<CompletionResponse>>,
        outcomes: Vec<Result<ToolOutcome>>,
    ) -> Harness {
        let completions = Arc::new(ScriptedCompletions::new(responses));
        let tools = Arc::new(ScriptedTools::new(outcomes));
        let store = Arc::new(InMemoryMessageStore::new());
        let sink = Arc::new(InMemoryTraceSink::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let conversation_id = Uuid::now_v7();

        let runner = AgentRunner::new(
            agent,
            config,
            conversation_id,
            completions.clone(),
            tools.clone(),
            store.clone(),
            sink.clone(),
            directory.clone(),
        );

        Harness {
            runner,
            completions,
            tools,
            store,
            sink,
            directory,
            conversation_id,
            user_id: Uuid::now_v7(),
        }
    }

    #[tokio::test]
    async fn test_plain_reply() {
        let h = harness(
            AgentKind::Main,
            vec![ScriptedCompletions::reply("Here you go.")],
        );

        let message = h.runner.run(h.turn("Write me a haiku")).await;
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.content, "Here you go.");
        assert_eq!(message.agent_type.as_deref(), Some("main"));
        assert!(!message.is_error());

        let stored = h.store.list_messages(h.conversation_id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].role, MessageRole::User);
        assert_eq!(stored[1].content, "Here you go.");
    }

    #[tokio::test]
    async fn test_attachments_are_inlined_into_user_message() {
        let h = harness(AgentKind::Main, vec![ScriptedCompletions::reply("Nice photo")]);

        let turn = h.turn("What is this?").with_attachments(vec![Attachment {
            name: "photo.png".to_string(),
            url: "https://cdn.example.com/photo.png".to_string(),
            kind: AttachmentKind::Image,
        }]);
        h.runner.run(turn).await;

        let stored = h.store.list_messages(h.conversation_id).await.unwrap();
        assert!(stored[0].content.starts_with("What is this?"));
        assert!(stored[0]
            .content
            .contains("[Attached image: photo.png, URL: https://cdn.example.com/photo.png]"));

        let request = h.completions.request(0).await;
        assert!(request.context_data.has_attachments);
        assert_eq!(request.context_data.attachment_types, vec!["image"]);
    }

    #[tokio::test]
    async fn test_handoff_delegates_to_target_agent() {
        let h = harness(
            AgentKind::Main,
            vec![
                ScriptedCompletions::handoff(
                    "Routing you to our script specialist.",
                    "script",
                    "User wants dialogue",
                ),
                ScriptedCompletions::reply("INT. OFFICE - DAY"),
            ],
        );

        let message = h.runner.run(h.turn("Write a scene")).await;
        assert_eq!(message.agent_type.as_deref(), Some("script"));
        assert_eq!(message.content, "INT. OFFICE - DAY");

        // The handing-off agent's annotated message is preserved in order.
        let stored = h.store.list_messages(h.conversation_id).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[1].agent_type.as_deref(), Some("main"));
        let annotation = stored[1].handoff_request.as_ref().unwrap();
        assert_eq!(annotation.target_agent, "script");
        assert_eq!(annotation.reason, "User wants dialogue");

        // The delegated call carries the continuation system message.
        let child_request = h.completions.request(1).await;
        assert!(child_request.context_data.is_handoff_continuation);
        let last = child_request.messages.last().unwrap();
        assert_eq!(last.role, "system");
        assert!(last.content.contains("continued by the script agent"));

        let records = h.sink.records().await;
        assert_eq!(records.len(), 1);
        let kinds: Vec<_> = records[0].events.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&TraceEventKind::HandoffStart));
        assert!(kinds.contains(&TraceEventKind::HandoffComplete));
    }

    #[tokio::test]
    async fn test_text_handoff_fallback() {
        let h = harness(
            AgentKind::Main,
            vec![
                ScriptedCompletions::reply("HANDOFF: script REASON: needs a screenplay"),
                ScriptedCompletions::reply("FADE IN:"),
            ],
        );

        let message = h.runner.run(h.turn("screenplay please")).await;
        assert_eq!(message.agent_type.as_deref(), Some("script"));
        assert_eq!(message.content, "FADE IN:");
        assert_eq!(h.completions.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_target_is_an_error_not_a_delegation() {
        let h = harness(
            AgentKind::Main,
            vec![ScriptedCompletions::handoff(
                "Let me transfer you.",
                "wizard",
                "magic required",
            )],
        );

        let message = h.runner.run(h.turn("abracadabra")).await;
        assert!(message.is_error());
        assert!(message.content.contains("Unknown agent: wizard"));
        // No delegation happened: one completion call only.
        assert_eq!(h.completions.call_count().await, 1);

        // The attempt itself is still on the record.
        let stored = h.store.list_messages(h.conversation_id).await.unwrap();
        assert!(stored.iter().any(|m| m.handoff_request.is_some()));
    }

    #[tokio::test]
    async fn test_error_hook_sees_the_failure() {
        let h = harness(
            AgentKind::Main,
            vec![ScriptedCompletions::handoff(
                "Passing you along.",
                "nonexistent",
                "out of my depth",
            )],
        );

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let runner = h.runner.with_error_hook(Arc::new(move |e: &OrchestratorError| {
            sink.lock().unwrap().push(e.to_string());
        }));

        let message = runner.run(TurnInput::new("hello", h.user_id)).await;
        assert!(message.is_error());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("nonexistent"));
    }

    #[tokio::test]
    async fn test_custom_agent_handoff_resolves_through_directory() {
        let profile = CustomAgentProfile {
            id: Uuid::now_v7(),
            name: "Poet".to_string(),
            description: None,
            instructions: "Answer in verse.".to_string(),
        };
        let target = profile.id.to_string();

        let h = harness(
            AgentKind::Main,
            vec![
                ScriptedCompletions::handoff("Over to the poet.", &target, "verse requested"),
                ScriptedCompletions::reply("Roses are red"),
            ],
        );
        h.directory.add_custom_agent(profile).await;

        let message = h.runner.run(h.turn("a poem please")).await;
        assert_eq!(message.agent_type.as_deref(), Some(target.as_str()));
        assert_eq!(message.content, "Roses are red");

        let child_request = h.completions.request(1).await;
        assert!(child_request.context_data.is_custom_agent);
    }

    #[tokio::test]
    async fn test_missing_custom_agent_is_unknown() {
        let ghost = Uuid::now_v7().to_string();
        let h = harness(
            AgentKind::Main,
            vec![ScriptedCompletions::handoff("One moment.", &ghost, "why not")],
        );

        let message = h.runner.run(h.turn("hi")).await;
        assert!(message.is_error());
        assert!(message.content.contains("Unknown agent"));
        assert_eq!(h.completions.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_handoff_cycle_is_cut_off() {
        let h = harness(
            AgentKind::Main,
            vec![
                ScriptedCompletions::handoff("to script", "script", "dialogue"),
                ScriptedCompletions::handoff("back to main", "main", "general question"),
            ],
        );

        let message = h.runner.run(h.turn("hello")).await;
        assert!(message.is_error());
        assert!(message.content.contains("Handoff cycle detected"));
        assert!(message.content.contains("main -> script -> main"));
        // main and script each got one call; the cycle never ran a third.
        assert_eq!(h.completions.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_hop_budget_is_enforced() {
        let config = RunnerConfig {
            max_handoffs: 1,
            ..RunnerConfig::default()
        };
        let h = harness_with(
            AgentKind::Main,
            config,
            vec![
                ScriptedCompletions::handoff("to script", "script", "dialogue"),
                ScriptedCompletions::handoff("to image", "image", "needs a prompt"),
            ],
            Vec::new(),
        );

        let message = h.runner.run(h.turn("hello")).await;
        assert!(message.is_error());
        assert!(message.content.contains("Handoff limit"));
        assert_eq!(h.completions.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_tool_call_executes_and_reports() {
        let h = harness_with(
            AgentKind::Tool,
            RunnerConfig::default(),
            vec![ScriptedCompletions::reply(
                r#"TOOL: image-to-video PARAMETERS: {"image_url": "https://x/y.png"}"#,
            )],
            vec![Ok(ToolOutcome {
                success: true,
                message: "Video ready at https://x/y.mp4".to_string(),
                output: None,
            })],
        );
        h.directory
            .set_tools(vec![ToolSummary {
                name: "image-to-video".to_string(),
                description: "Convert an image to video".to_string(),
                required_credits: 2.0,
                parameters: serde_json::json!({}),
            }])
            .await;

        let message = h.runner.run(h.turn("animate this")).await;
        assert_eq!(message.role, MessageRole::Tool);
        assert_eq!(message.content, "Video ready at https://x/y.mp4");
        assert_eq!(message.tasks.len(), 1);
        assert_eq!(message.tasks[0].status, crate::message::TaskStatus::Completed);

        let invocations = h.tools.invocations.lock().await;
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].tool_name, "image-to-video");
        assert_eq!(invocations[0].parameters["image_url"], "https://x/y.png");
        drop(invocations);

        // The tool agent's request advertises the directory.
        let request = h.completions.request(0).await;
        assert_eq!(request.context_data.available_tools.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_failure_is_a_message_not_a_crash() {
        let h = harness_with(
            AgentKind::Tool,
            RunnerConfig::default(),
            vec![ScriptedCompletions::reply(
                r#"TOOL: upscale PARAMETERS: {"factor": 8}"#,
            )],
            vec![Ok(ToolOutcome {
                success: false,
                message: "unsupported scale factor".to_string(),
                output: None,
            })],
        );

        let message = h.runner.run(h.turn("make it huge")).await;
        assert!(message.is_error());
        assert_eq!(message.content, "Error: unsupported scale factor");
        assert_eq!(message.tasks[0].status, crate::message::TaskStatus::Error);
    }

    #[tokio::test]
    async fn test_malformed_tool_json_falls_back_to_plain_reply() {
        let h = harness_with(
            AgentKind::Tool,
            RunnerConfig::default(),
            vec![ScriptedCompletions::reply(
                r#"TOOL: upscale PARAMETERS: {"factor": }"#,
            )],
            Vec::new(),
        );

        let message = h.runner.run(h.turn("upscale it")).await;
        assert_eq!(message.role, MessageRole::Assistant);
        assert!(!message.is_error());
        assert_eq!(h.tools.invocation_count().await, 0);
    }

    #[tokio::test]
    async fn test_non_tool_agent_ignores_tool_format() {
        let h = harness(
            AgentKind::Main,
            vec![ScriptedCompletions::reply(
                r#"TOOL: upscale PARAMETERS: {"factor": 2}"#,
            )],
        );

        let message = h.runner.run(h.turn("hmm")).await;
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(h.tools.invocation_count().await, 0);
    }

    #[tokio::test]
    async fn test_quota_error_surfaces_after_a_single_call() {
        let h = harness(
            AgentKind::Main,
            vec![Err(OrchestratorError::quota("exceeded your current quota"))],
        );

        let message = h.runner.run(h.turn("hello")).await;
        assert!(message.is_error());
        assert!(message.content.contains("Quota exceeded"));
        assert_eq!(h.completions.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_trace_flushes_exactly_once_across_a_handoff_chain() {
        let h = harness(
            AgentKind::Main,
            vec![
                ScriptedCompletions::handoff("to script", "script", "dialogue"),
                ScriptedCompletions::reply("done"),
            ],
        );

        h.runner.run(h.turn("hello")).await;

        let records = h.sink.records().await;
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.agent_type, "main");
        assert_eq!(record.model_used.as_deref(), Some("gpt-4o-mini"));
        // Both runs' api_call events landed in the one trace.
        let api_calls = record
            .events
            .iter()
            .filter(|e| e.kind == TraceEventKind::ApiCall)
            .count();
        assert_eq!(api_calls, 2);
    }

    #[tokio::test]
    async fn test_trace_flushes_on_error_too() {
        let h = harness(
            AgentKind::Main,
            vec![Err(OrchestratorError::validation("bad request"))],
        );

        h.runner.run(h.turn("hello")).await;
        let records = h.sink.records().await;
        assert_eq!(records.len(), 1);
        assert!(records[0]
            .events
            .iter()
            .any(|e| e.kind == TraceEventKind::Error));
    }

    #[tokio::test]
    async fn test_non_tool_agent_does_not_fetch_tool_directory() {
        let h = harness(AgentKind::Main, vec![ScriptedCompletions::reply("hi")]);
        h.directory
            .set_tools(vec![ToolSummary {
                name: "upscale".to_string(),
                description: "Upscale an image".to_string(),
                required_credits: 1.0,
                parameters: serde_json::json!({}),
            }])
            .await;

        h.runner.run(h.turn("hello")).await;
        let request = h.completions.request(0).await;
        assert!(request.context_data.available_tools.is_empty());
    }
}
