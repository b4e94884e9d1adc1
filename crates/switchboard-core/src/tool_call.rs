// Tool call extraction
//
// The tool agent is instructed to answer in the form
// `TOOL: [tool-name], PARAMETERS: {"param1": "value1"}`. This module pulls
// that structure back out of the reply text. A reply whose PARAMETERS block
// is not valid JSON is treated as a plain reply, not an error: the text still
// reaches the user, it just doesn't trigger an execution.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

fn tool_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)TOOL:\s*\[?([a-z0-9_-]+)\]?\s*,?\s*PARAMETERS:\s*(\{.*\})")
            .expect("tool pattern is valid")
    })
}

/// A tool call parsed out of a reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ToolCall {
    pub name: String,
    pub parameters: serde_json::Value,
}

/// Extract a tool call from reply text, or None if the reply has no
/// well-formed call in it.
pub fn parse_tool_call(text: &str) -> Option<ToolCall> {
    let caps = tool_pattern().captures(text)?;
    let name = caps[1].to_lowercase();

    match serde_json::from_str(&caps[2]) {
        Ok(parameters) => Some(ToolCall { name, parameters }),
        Err(e) => {
            tracing::debug!(tool = %name, error = %e, "tool parameters are not valid JSON, treating reply as plain text");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_basic_call() {
        let call = parse_tool_call(r#"TOOL: image-to-video PARAMETERS: {"image_url": "https://x/y.png"}"#)
            .unwrap();
        assert_eq!(call.name, "image-to-video");
        assert_eq!(call.parameters, json!({"image_url": "https://x/y.png"}));
    }

    #[test]
    fn test_parse_bracketed_name_with_comma() {
        // The exact shape the format instruction asks for.
        let call = parse_tool_call(r#"TOOL: [image-to-video], PARAMETERS: {"fps": 24}"#).unwrap();
        assert_eq!(call.name, "image-to-video");
        assert_eq!(call.parameters, json!({"fps": 24}));
    }

    #[test]
    fn test_parse_nested_parameters() {
        let call = parse_tool_call(
            r#"Running it now. TOOL: render PARAMETERS: {"scene": {"width": 1920, "height": 1080}}"#,
        )
        .unwrap();
        assert_eq!(call.parameters["scene"]["height"], 1080);
    }

    #[test]
    fn test_parse_spans_lines() {
        let text = "TOOL: upscale\nPARAMETERS: {\n  \"factor\": 2\n}";
        let call = parse_tool_call(text).unwrap();
        assert_eq!(call.name, "upscale");
        assert_eq!(call.parameters["factor"], 2);
    }

    #[test]
    fn test_malformed_json_is_absent_not_error() {
        assert!(parse_tool_call(r#"TOOL: render PARAMETERS: {"width": }"#).is_none());
        assert!(parse_tool_call("TOOL: render PARAMETERS: not json at all").is_none());
    }

    #[test]
    fn test_plain_reply_is_not_a_call() {
        assert!(parse_tool_call("I can convert images to video for you.").is_none());
    }
}
