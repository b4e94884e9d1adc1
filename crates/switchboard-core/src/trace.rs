// Run tracing
//
// Every run records a trace: init, each completion call, handoffs, tool
// executions, the final response or error. One TraceRecorder is shared by the
// whole handoff chain, so a delegated run appends to its parent's trace
// instead of opening a new one. The recorder flushes once, at the end of the
// root run.
//
// Decision: persistence is best-effort. A trace that fails to write is logged
// and dropped; it never fails the run that produced it.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::agents::AgentKind;
use crate::message::Message;
use crate::traits::TraceSink;

/// What a trace event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TraceEventKind {
    Init,
    ApiCall,
    HandoffStart,
    HandoffComplete,
    ToolExecution,
    Response,
    Error,
}

impl std::fmt::Display for TraceEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceEventKind::Init => write!(f, "init"),
            TraceEventKind::ApiCall => write!(f, "api_call"),
            TraceEventKind::HandoffStart => write!(f, "handoff_start"),
            TraceEventKind::HandoffComplete => write!(f, "handoff_complete"),
            TraceEventKind::ToolExecution => write!(f, "tool_execution"),
            TraceEventKind::Response => write!(f, "response"),
            TraceEventKind::Error => write!(f, "error"),
        }
    }
}

/// One timestamped event in a run trace
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TraceEvent {
    pub kind: TraceEventKind,
    pub at: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// The complete trace of one run, as handed to the sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub trace_id: Uuid,
    pub run_id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub agent_type: String,
    pub model_used: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub events: Vec<TraceEvent>,
    pub messages: Vec<Message>,
}

struct TraceBuffer {
    events: Vec<TraceEvent>,
    messages: Vec<Message>,
    model_used: Option<String>,
}

/// Accumulates trace events for one run and its handoff descendants
pub struct TraceRecorder {
    trace_id: Uuid,
    run_id: Uuid,
    conversation_id: Uuid,
    user_id: Uuid,
    root_agent: String,
    started_at: DateTime<Utc>,
    buffer: Mutex<TraceBuffer>,
    flushed: AtomicBool,
}

impl TraceRecorder {
    pub fn new(conversation_id: Uuid, user_id: Uuid, root_agent: &AgentKind) -> Self {
        let trace_id = Uuid::now_v7();
        let init = TraceEvent {
            kind: TraceEventKind::Init,
            at: Utc::now(),
            data: json!({ "agent": root_agent.to_string() }),
        };

        Self {
            trace_id,
            run_id: Uuid::now_v7(),
            conversation_id,
            user_id,
            root_agent: root_agent.to_string(),
            started_at: Utc::now(),
            buffer: Mutex::new(TraceBuffer {
                events: vec![init],
                messages: Vec::new(),
                model_used: None,
            }),
            flushed: AtomicBool::new(false),
        }
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Append an event
    pub async fn record(&self, kind: TraceEventKind, data: serde_json::Value) {
        let mut buffer = self.buffer.lock().await;
        buffer.events.push(TraceEvent {
            kind,
            at: Utc::now(),
            data,
        });
    }

    /// Append a message emitted during the run
    pub async fn record_message(&self, message: &Message) {
        let mut buffer = self.buffer.lock().await;
        buffer.messages.push(message.clone());
    }

    /// Note which model served the run. Later calls win, so a handoff chain
    /// ends up reporting the model that produced the final reply.
    pub async fn set_model(&self, model: impl Into<String>) {
        let mut buffer = self.buffer.lock().await;
        buffer.model_used = Some(model.into());
    }

    /// Persist the trace through the sink. Flushes at most once; a second
    /// call is a no-op. Failures are logged, never propagated.
    pub async fn flush(&self, sink: &dyn TraceSink) {
        if self
            .flushed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let record = {
            let buffer = self.buffer.lock().await;
            TraceRecord {
                trace_id: self.trace_id,
                run_id: self.run_id,
                conversation_id: self.conversation_id,
                user_id: self.user_id,
                agent_type: self.root_agent.clone(),
                model_used: buffer.model_used.clone(),
                started_at: self.started_at,
                finished_at: Utc::now(),
                events: buffer.events.clone(),
                messages: buffer.messages.clone(),
            }
        };

        if let Err(e) = sink.record_trace(record).await {
            tracing::warn!(trace_id = %self.trace_id, error = %e, "failed to persist trace");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TraceSink for CountingSink {
        async fn record_trace(&self, _record: TraceRecord) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl TraceSink for FailingSink {
        async fn record_trace(&self, _record: TraceRecord) -> Result<()> {
            Err(crate::error::OrchestratorError::trace("sink unavailable"))
        }
    }

    #[tokio::test]
    async fn test_records_init_event_on_create() {
        let recorder = TraceRecorder::new(Uuid::now_v7(), Uuid::now_v7(), &AgentKind::Main);
        let buffer = recorder.buffer.lock().await;
        assert_eq!(buffer.events.len(), 1);
        assert_eq!(buffer.events[0].kind, TraceEventKind::Init);
        assert_eq!(buffer.events[0].data["agent"], "main");
    }

    #[tokio::test]
    async fn test_flush_happens_once() {
        let recorder = TraceRecorder::new(Uuid::now_v7(), Uuid::now_v7(), &AgentKind::Main);
        recorder
            .record(TraceEventKind::Response, json!({ "length": 42 }))
            .await;

        let sink = CountingSink {
            calls: AtomicUsize::new(0),
        };
        recorder.flush(&sink).await;
        recorder.flush(&sink).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_flush_swallows_sink_errors() {
        let recorder = TraceRecorder::new(Uuid::now_v7(), Uuid::now_v7(), &AgentKind::Main);
        // Must not panic or propagate.
        recorder.flush(&FailingSink).await;
    }

    #[tokio::test]
    async fn test_last_model_wins() {
        let recorder = TraceRecorder::new(Uuid::now_v7(), Uuid::now_v7(), &AgentKind::Main);
        recorder.set_model("gpt-4o-mini").await;
        recorder.set_model("gpt-4o").await;
        let buffer = recorder.buffer.lock().await;
        assert_eq!(buffer.model_used.as_deref(), Some("gpt-4o"));
    }
}
