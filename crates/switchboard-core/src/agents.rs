// Agent model
//
// The built-in agent set is fixed; custom agents are user-defined rows
// addressed by UUID. Handoff targets are validated against both before any
// delegation happens, so an agent can never transfer a conversation to a
// persona that does not exist.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OrchestratorError;

/// Instructions used when an agent has none of its own
pub const DEFAULT_INSTRUCTIONS: &str = "You are an AI assistant helping with the user's request. Respond helpfully and provide accurate information.";

/// Token ceiling requested for every completion
pub const MAX_COMPLETION_TOKENS: u32 = 4000;

/// An addressable agent persona
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AgentKind {
    /// General-purpose conversational agent, the default entry point
    Main,
    /// Script and narrative writing
    Script,
    /// Image prompt generation
    Image,
    /// Tool orchestration; replies in the structured tool-call format
    Tool,
    /// Scene description for visual content
    Scene,
    /// User-defined agent addressed by its row ID
    Custom(Uuid),
}

impl AgentKind {
    /// The fixed built-in set, in directory order
    pub const BUILT_IN: [AgentKind; 5] = [
        AgentKind::Main,
        AgentKind::Script,
        AgentKind::Image,
        AgentKind::Tool,
        AgentKind::Scene,
    ];

    /// Parse an agent identifier: a built-in name or a custom agent UUID.
    /// Returns None for anything else; callers decide whether that is an error.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "main" => Some(AgentKind::Main),
            "script" => Some(AgentKind::Script),
            "image" => Some(AgentKind::Image),
            "tool" => Some(AgentKind::Tool),
            "scene" => Some(AgentKind::Scene),
            other => Uuid::parse_str(other).ok().map(AgentKind::Custom),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, AgentKind::Custom(_))
    }

    /// Sampling temperature for this agent. The tool agent runs cold so its
    /// structured output stays parseable.
    pub fn temperature(&self) -> f32 {
        match self {
            AgentKind::Tool => 0.1,
            _ => 0.7,
        }
    }

    /// Model the completion service should run for this turn
    pub fn model(use_performance_model: bool) -> &'static str {
        if use_performance_model {
            "gpt-4o"
        } else {
            "gpt-4o-mini"
        }
    }

    /// Directory entry for a built-in agent; None for custom agents, whose
    /// profile lives in storage.
    pub fn definition(&self) -> Option<AgentDefinition> {
        let (display_name, description) = match self {
            AgentKind::Main => (
                "Main Assistant",
                "General-purpose AI assistant for broad queries",
            ),
            AgentKind::Script => (
                "Script Writer",
                "Specialized in creating scripts, dialogue, and narrative content",
            ),
            AgentKind::Image => (
                "Image Prompt",
                "Creates detailed prompts for AI image generation systems",
            ),
            AgentKind::Tool => (
                "Tool Orchestrator",
                "Helps users use tools like image-to-video conversion",
            ),
            AgentKind::Scene => (
                "Scene Description",
                "Creates detailed scene descriptions for visual content",
            ),
            AgentKind::Custom(_) => return None,
        };

        Some(AgentDefinition {
            kind: self.clone(),
            display_name,
            description,
        })
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::Main => write!(f, "main"),
            AgentKind::Script => write!(f, "script"),
            AgentKind::Image => write!(f, "image"),
            AgentKind::Tool => write!(f, "tool"),
            AgentKind::Scene => write!(f, "scene"),
            AgentKind::Custom(id) => write!(f, "{id}"),
        }
    }
}

impl std::str::FromStr for AgentKind {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentKind::parse(s).ok_or_else(|| OrchestratorError::UnknownAgent(s.to_string()))
    }
}

/// Directory entry for a built-in agent
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub kind: AgentKind,
    pub display_name: &'static str,
    pub description: &'static str,
}

/// Profile of a user-defined agent, resolved from storage by UUID
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CustomAgentProfile {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub instructions: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_built_in() {
        assert_eq!(AgentKind::parse("main"), Some(AgentKind::Main));
        assert_eq!(AgentKind::parse("Script"), Some(AgentKind::Script));
        assert_eq!(AgentKind::parse("  TOOL  "), Some(AgentKind::Tool));
    }

    #[test]
    fn test_parse_custom_uuid() {
        let id = Uuid::now_v7();
        assert_eq!(AgentKind::parse(&id.to_string()), Some(AgentKind::Custom(id)));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(AgentKind::parse("wizard"), None);
        assert_eq!(AgentKind::parse(""), None);
        assert!(AgentKind::from_str("wizard").is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for kind in AgentKind::BUILT_IN {
            let rendered = kind.to_string();
            assert_eq!(AgentKind::parse(&rendered), Some(kind));
        }
    }

    #[test]
    fn test_tool_agent_runs_cold() {
        assert_eq!(AgentKind::Tool.temperature(), 0.1);
        assert_eq!(AgentKind::Main.temperature(), 0.7);
    }

    #[test]
    fn test_model_selection() {
        assert_eq!(AgentKind::model(true), "gpt-4o");
        assert_eq!(AgentKind::model(false), "gpt-4o-mini");
    }

    #[test]
    fn test_built_in_definitions() {
        for kind in AgentKind::BUILT_IN {
            let def = kind.definition().unwrap();
            assert!(!def.display_name.is_empty());
            assert!(!def.description.is_empty());
        }
        assert!(AgentKind::Custom(Uuid::now_v7()).definition().is_none());
    }
}
