//! Stream-json event model.
//!
//! Each line of an agent log is one JSON object tagged by `type`. Only the
//! fields this tool reads are modelled; everything else is ignored, and an
//! unrecognized `type` decodes to [`Event::Unknown`].

use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::Value;

/// Tool name the agent uses to dispatch a named skill.
pub const SKILL_TOOL: &str = "Skill";

/// One decoded log record.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    Assistant {
        #[serde(default)]
        message: Option<AssistantMessage>,
    },
    User {
        #[serde(default)]
        message: Option<UserMessage>,
        #[serde(default, rename = "toolUseResult")]
        tool_use_result: Option<Value>,
    },
    Result {
        #[serde(default)]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        num_turns: Option<u64>,
        #[serde(default)]
        usage: Option<TokenUsage>,
    },
    /// Bare tool start emitted by some agent builds outside a message.
    ToolUse {
        #[serde(default)]
        name: Option<String>,
    },
    /// Bare tool completion emitted by some agent builds outside a message.
    ToolResult {
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Content,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserMessage {
    #[serde(default)]
    pub content: Content,
}

/// Message content: a list of blocks, or anything else (usually plain text),
/// which carries nothing this tool reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Blocks(Vec<ContentBlock>),
    Opaque(IgnoredAny),
}

impl Default for Content {
    fn default() -> Self {
        Content::Blocks(Vec::new())
    }
}

impl Content {
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            Content::Blocks(blocks) => blocks,
            Content::Opaque(_) => &[],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Other,
}

/// Token counters as reported by the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

/// Why a line could not be decoded.
#[derive(Debug)]
pub enum DecodeError {
    /// Blank line.
    Empty,
    /// Not JSON at all.
    NotJson(serde_json::Error),
    /// JSON, but not an object this model can read.
    Shape(serde_json::Error),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "empty line"),
            DecodeError::NotJson(e) => write!(f, "not JSON: {e}"),
            DecodeError::Shape(e) => write!(f, "unexpected event shape: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Empty => None,
            DecodeError::NotJson(e) | DecodeError::Shape(e) => Some(e),
        }
    }
}

impl Event {
    /// Decode one log line.
    pub fn decode(line: &str) -> Result<Event, DecodeError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(DecodeError::Empty);
        }
        let value: Value = serde_json::from_str(line).map_err(DecodeError::NotJson)?;
        serde_json::from_value(value).map_err(DecodeError::Shape)
    }
}

/// A `Skill` dispatch found in an assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SkillInvocation {
    pub skill: Option<String>,
    pub args: Option<String>,
}

impl SkillInvocation {
    /// Build from a tool call, if the call is a skill dispatch.
    pub fn from_tool_call(name: &str, input: &Value) -> Option<Self> {
        if name != SKILL_TOOL {
            return None;
        }
        let field = |key: &str| match input.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        Some(Self {
            skill: field("skill"),
            args: field("args"),
        })
    }
}

/// Skill invocations in an assistant message, in order.
pub fn skill_invocations(message: &AssistantMessage) -> impl Iterator<Item = SkillInvocation> + '_ {
    message.content.blocks().iter().filter_map(|b| match b {
        ContentBlock::ToolUse { name, input } => SkillInvocation::from_tool_call(name, input),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_assistant_with_tools_and_usage() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hi"},{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}}],"usage":{"input_tokens":10,"output_tokens":5,"cache_read_input_tokens":7}}}"#;
        let Event::Assistant { message: Some(msg) } = Event::decode(line).unwrap() else {
            panic!("expected assistant");
        };
        assert_eq!(msg.content.blocks().len(), 2);
        assert!(matches!(
            &msg.content.blocks()[1],
            ContentBlock::ToolUse { name, .. } if name == "Bash"
        ));
        assert_eq!(
            msg.usage.unwrap(),
            TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                cache_creation_input_tokens: 0,
                cache_read_input_tokens: 7,
            }
        );
    }

    #[test]
    fn test_decode_result() {
        let line = r#"{"type":"result","subtype":"success","total_cost_usd":1.23,"num_turns":4,"usage":{"input_tokens":100,"output_tokens":50}}"#;
        let Event::Result {
            total_cost_usd,
            num_turns,
            usage,
        } = Event::decode(line).unwrap()
        else {
            panic!("expected result");
        };
        assert_eq!(total_cost_usd, Some(1.23));
        assert_eq!(num_turns, Some(4));
        assert_eq!(usage.unwrap().output_tokens, 50);
    }

    #[test]
    fn test_decode_user_with_text_content_and_tool_use_result() {
        let line = r#"{"type":"user","message":{"role":"user","content":"plain"},"toolUseResult":{"agentId":"a1","usage":{"input_tokens":3}}}"#;
        let Event::User {
            message,
            tool_use_result,
        } = Event::decode(line).unwrap()
        else {
            panic!("expected user");
        };
        assert!(message.unwrap().content.blocks().is_empty());
        assert_eq!(tool_use_result.unwrap()["agentId"], "a1");
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let event = Event::decode(r#"{"type":"stream_event","delta":{}}"#).unwrap();
        assert!(matches!(event, Event::Unknown));
    }

    #[test]
    fn test_unknown_content_block_is_other() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"hmm"}]}}"#;
        let Event::Assistant { message: Some(msg) } = Event::decode(line).unwrap() else {
            panic!("expected assistant");
        };
        assert!(matches!(msg.content.blocks()[0], ContentBlock::Other));
    }

    #[test]
    fn test_malformed_block_list_is_opaque() {
        let line = r#"{"type":"assistant","message":{"content":[1,"x"],"usage":{"input_tokens":4}}}"#;
        let Event::Assistant { message: Some(msg) } = Event::decode(line).unwrap() else {
            panic!("expected assistant");
        };
        assert!(msg.content.blocks().is_empty());
        assert_eq!(msg.usage.unwrap().input_tokens, 4);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(Event::decode("   "), Err(DecodeError::Empty)));
        assert!(matches!(
            Event::decode("npm WARN deprecated"),
            Err(DecodeError::NotJson(_))
        ));
        assert!(matches!(Event::decode("[1,2]"), Err(DecodeError::Shape(_))));
        assert!(matches!(
            Event::decode(r#"{"no_type":true}"#),
            Err(DecodeError::Shape(_))
        ));
        assert!(matches!(
            Event::decode(r#"{"type":"result","num_turns":"four"}"#),
            Err(DecodeError::Shape(_))
        ));
    }

    #[test]
    fn test_skill_invocations_only_for_skill_tool() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"tool_use","name":"Skill","input":{"skill":"test-writer","args":"unit"}},
            {"type":"tool_use","name":"Read","input":{"skill":"nope"}},
            {"type":"tool_use","name":"Skill","input":{"skill":"planner"}}
        ]}}"#;
        let Event::Assistant { message: Some(msg) } = Event::decode(line).unwrap() else {
            panic!("expected assistant");
        };
        let skills: Vec<_> = skill_invocations(&msg).collect();
        assert_eq!(
            skills,
            vec![
                SkillInvocation {
                    skill: Some("test-writer".to_string()),
                    args: Some("unit".to_string()),
                },
                SkillInvocation {
                    skill: Some("planner".to_string()),
                    args: None,
                },
            ]
        );
    }
}
