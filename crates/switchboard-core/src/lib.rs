// Switchboard core
//
// Domain types and the orchestration engine: messages, the agent directory,
// handoff parsing and chain tracking, tool call extraction, run tracing, the
// retry policy, the automation session model, and the agent runner itself.
// Service seams live in `traits`; map-backed implementations in `memory`.

pub mod agents;
pub mod automation;
pub mod error;
pub mod handoff;
pub mod memory;
pub mod message;
pub mod retry;
pub mod runner;
pub mod tool_call;
pub mod trace;
pub mod traits;

// Re-export commonly used types
pub use agents::{
    AgentDefinition, AgentKind, CustomAgentProfile, DEFAULT_INSTRUCTIONS, MAX_COMPLETION_TOKENS,
};
pub use automation::{
    ActionStatus, AutomationAction, AutomationSession, SessionStatus, ACTION_MAX_ATTEMPTS,
    ACTION_RETRY_DELAY_SECS, DEFAULT_POLL_INTERVAL_SECS, MINIMUM_SESSION_CREDITS,
    TRANSPARENT_PIXEL_PNG,
};
pub use error::{OrchestratorError, Result};
pub use handoff::{parse_handoff, HandoffChain, HandoffOrigin, DEFAULT_HANDOFF_REASON};
pub use message::{
    format_attachments, Attachment, AttachmentKind, HandoffRequest, Message, MessageRole,
    MessageStatus, Task, TaskStatus,
};
pub use retry::{retry_with, RetryPolicy};
pub use runner::{AgentRunner, ErrorHook, RunnerConfig, TurnInput, DEFAULT_MAX_HANDOFFS};
pub use tool_call::{parse_tool_call, ToolCall};
pub use trace::{TraceEvent, TraceEventKind, TraceRecord, TraceRecorder};
pub use traits::{
    AgentDirectory, AutomationProvider, AutomationStore, CompletionClient, CompletionMessage,
    CompletionRequest, CompletionResponse, ContextData, HandoffDirective, MessageStore,
    ProviderPhase, ProviderStep, ProviderTaskHandle, ProviderTaskStatus, ToolExecutor,
    ToolInvocation, ToolOutcome, ToolSummary, TraceSink,
};
