// Postgres storage layer with sqlx
//
// This crate provides database implementations for core traits:
// - PgMessageStore: implements MessageStore for conversation history
// - PgTraceSink: implements TraceSink for run traces
// - PgDirectory: implements AgentDirectory for custom agents and tools
// - PgAutomationStore: implements AutomationStore for sessions, actions
//   and the credit ledger

pub mod automation_store;
pub mod directory;
pub mod message_store;
pub mod models;
pub mod repositories;
pub mod trace_sink;

pub use automation_store::PgAutomationStore;
pub use directory::PgDirectory;
pub use message_store::PgMessageStore;
pub use models::*;
pub use repositories::Database;
pub use trace_sink::PgTraceSink;
