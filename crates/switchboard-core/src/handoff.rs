// Handoff parsing and chain tracking
//
// A handoff can arrive two ways: as a structured field on the completion
// response, or embedded in the reply text in the `HANDOFF: <agent> REASON:
// <text>` format. The structured form wins; text parsing is the fallback for
// models that answer in prose.
//
// Decision: the chain keeps both insertion order (for error messages) and a
// set (for membership checks), so revisiting any earlier agent is rejected
// before the hop budget is even consulted.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::agents::AgentKind;
use crate::error::{OrchestratorError, Result};
use crate::message::HandoffRequest;

/// Reason recorded when the model names a target but gives no reason
pub const DEFAULT_HANDOFF_REASON: &str = "Specialized assistance required";

fn handoff_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)HANDOFF:\s*([a-z0-9_-]+)(?:[,\s]\s*REASON:|\s+REASON:)\s*(.+?)(?:$|[\n\r])")
            .expect("handoff pattern is valid")
    })
}

fn agent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)HANDOFF:\s*([a-z0-9_-]+)").expect("agent pattern is valid")
    })
}

fn reason_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)REASON:\s*(.+?)(?:$|[\n\r])").expect("reason pattern is valid")
    })
}

/// Extract a handoff request from reply text.
///
/// Tries the combined `HANDOFF: <agent> REASON: <text>` form first. If that
/// fails but the text mentions a handoff at all, falls back to matching agent
/// and reason separately; an agent with no reason gets the default reason.
pub fn parse_handoff(text: &str) -> Option<HandoffRequest> {
    if let Some(caps) = handoff_pattern().captures(text) {
        return Some(HandoffRequest {
            target_agent: caps[1].to_lowercase(),
            reason: caps[2].trim().to_string(),
            additional_context: None,
        });
    }

    if !text.to_lowercase().contains("handoff") {
        return None;
    }

    let target = agent_pattern().captures(text)?;
    let reason = reason_pattern()
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_else(|| DEFAULT_HANDOFF_REASON.to_string());

    Some(HandoffRequest {
        target_agent: target[1].to_lowercase(),
        reason,
        additional_context: None,
    })
}

/// Continuation message injected when a conversation transfers to a new agent
pub fn continuation_message(agent: &AgentKind) -> String {
    format!(
        "The conversation is being continued by the {agent} agent after a handoff. \
         Review the previous messages to understand context. Focus on responding to \
         the user's needs without asking for information they've already provided."
    )
}

/// Where a run came from, when it is the receiving side of a handoff
#[derive(Debug, Clone)]
pub struct HandoffOrigin {
    pub from: AgentKind,
    pub reason: String,
    pub additional_context: Option<serde_json::Value>,
}

/// The agents a conversation has passed through, root first
#[derive(Debug, Clone)]
pub struct HandoffChain {
    visited: Vec<AgentKind>,
    seen: HashSet<AgentKind>,
}

impl HandoffChain {
    pub fn new(root: AgentKind) -> Self {
        let mut seen = HashSet::new();
        seen.insert(root.clone());
        Self {
            visited: vec![root],
            seen,
        }
    }

    /// Hops taken so far; the root agent is not a hop
    pub fn hops(&self) -> usize {
        self.visited.len().saturating_sub(1)
    }

    pub fn contains(&self, agent: &AgentKind) -> bool {
        self.seen.contains(agent)
    }

    /// The chain rendered as `main -> script -> image`
    pub fn path(&self) -> String {
        self.visited
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// A new chain with `next` appended. Rejects a target already in the
    /// chain, then a chain that would exceed `max_hops`.
    pub fn extended(&self, next: AgentKind, max_hops: usize) -> Result<Self> {
        if self.contains(&next) {
            return Err(OrchestratorError::HandoffCycle(format!(
                "{} -> {next}",
                self.path()
            )));
        }
        if self.hops() + 1 > max_hops {
            return Err(OrchestratorError::HandoffLimit(max_hops));
        }

        let mut chain = self.clone();
        chain.seen.insert(next.clone());
        chain.visited.push(next);
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_combined_format() {
        let request = parse_handoff("HANDOFF: script REASON: User wants a screenplay").unwrap();
        assert_eq!(request.target_agent, "script");
        assert_eq!(request.reason, "User wants a screenplay");
    }

    #[test]
    fn test_parse_comma_separator() {
        let request = parse_handoff("HANDOFF: image, REASON: needs a visual prompt").unwrap();
        assert_eq!(request.target_agent, "image");
        assert_eq!(request.reason, "needs a visual prompt");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let request = parse_handoff("handoff: Scene reason: describe the set").unwrap();
        assert_eq!(request.target_agent, "scene");
    }

    #[test]
    fn test_reason_stops_at_newline() {
        let request =
            parse_handoff("HANDOFF: script REASON: write dialogue\nAnd some trailing text").unwrap();
        assert_eq!(request.reason, "write dialogue");
    }

    #[test]
    fn test_fallback_agent_only_gets_default_reason() {
        let text = "I'll do a handoff for this one.\nHANDOFF: tool";
        let request = parse_handoff(text).unwrap();
        assert_eq!(request.target_agent, "tool");
        assert_eq!(request.reason, DEFAULT_HANDOFF_REASON);
    }

    #[test]
    fn test_fallback_finds_separated_fields() {
        let text = "Handoff time.\nHANDOFF: image\nSome commentary.\nREASON: prompt work";
        let request = parse_handoff(text).unwrap();
        assert_eq!(request.target_agent, "image");
        assert_eq!(request.reason, "prompt work");
    }

    #[test]
    fn test_plain_reply_is_not_a_handoff() {
        assert!(parse_handoff("Here is your script draft.").is_none());
        // The word alone is not enough without an agent to transfer to.
        assert!(parse_handoff("A handoff happens when agents transfer work.").is_none());
    }

    #[test]
    fn test_continuation_message_names_agent() {
        let text = continuation_message(&AgentKind::Script);
        assert!(text.contains("continued by the script agent"));
    }

    #[test]
    fn test_chain_rejects_cycle() {
        let chain = HandoffChain::new(AgentKind::Main);
        let chain = chain.extended(AgentKind::Script, 5).unwrap();
        let err = chain.extended(AgentKind::Main, 5).unwrap_err();
        assert!(matches!(err, OrchestratorError::HandoffCycle(_)));
        assert!(err.to_string().contains("main -> script -> main"));
    }

    #[test]
    fn test_chain_enforces_hop_budget() {
        let chain = HandoffChain::new(AgentKind::Main);
        let chain = chain.extended(AgentKind::Script, 2).unwrap();
        let chain = chain.extended(AgentKind::Image, 2).unwrap();
        let err = chain.extended(AgentKind::Scene, 2).unwrap_err();
        assert!(matches!(err, OrchestratorError::HandoffLimit(2)));
    }

    #[test]
    fn test_cycle_reported_before_budget() {
        let chain = HandoffChain::new(AgentKind::Main);
        let chain = chain.extended(AgentKind::Script, 1).unwrap();
        let err = chain.extended(AgentKind::Main, 1).unwrap_err();
        assert!(matches!(err, OrchestratorError::HandoffCycle(_)));
    }
}
