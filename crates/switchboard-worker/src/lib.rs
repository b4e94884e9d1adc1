pub mod engine;

// Re-export main types
pub use engine::{AutomationEngine, EngineConfig};
