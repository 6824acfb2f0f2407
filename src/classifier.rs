//! Live progress classification of agent log lines.
//!
//! Fed one line at a time by the session poll loop. Never fails: lines that
//! don't decode are dropped, or echoed as a short diagnostic when they are
//! plain text rather than broken JSON.

use crate::events::{skill_invocations, ContentBlock, DecodeError, Event, SkillInvocation};

/// Longest diagnostic preview echoed for a non-JSON line, in characters.
const PREVIEW_CHARS: usize = 80;

/// Totals reported by the session's most recent `result` event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub total_cost_usd: Option<f64>,
    pub num_turns: Option<u64>,
    pub total_input_tokens: Option<u64>,
    pub total_output_tokens: Option<u64>,
}

/// A live progress update.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    SessionStarted { model: Option<String> },
    Turn(u64),
    ToolStarted(String),
    ToolFinished { is_error: bool },
    Diagnostic(String),
}

impl Progress {
    /// Whether the rendered text ends the terminal line. A tool start stays
    /// open so its completion glyph lands on the same line.
    pub fn ends_line(&self) -> bool {
        !matches!(self, Progress::ToolStarted(_))
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Progress::SessionStarted { model: Some(model) } => {
                write!(f, "🟢 Session started ({model})")
            }
            Progress::SessionStarted { model: None } => write!(f, "🟢 Session started"),
            Progress::Turn(n) => write!(f, "\n📍 Turn {n}"),
            Progress::ToolStarted(name) => write!(f, "   🔧 {name}..."),
            Progress::ToolFinished { is_error: true } => write!(f, " ❌"),
            Progress::ToolFinished { is_error: false } => write!(f, " ✓"),
            Progress::Diagnostic(text) => write!(f, "   {text}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct Classifier {
    turns: u64,
    current_tool: Option<String>,
    lines_seen: u64,
    stats: RunStats,
    skills: Vec<SkillInvocation>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one raw log line.
    pub fn feed_line(&mut self, line: &str) -> Vec<Progress> {
        self.lines_seen += 1;
        match Event::decode(line) {
            Ok(event) => self.classify(&event),
            Err(DecodeError::NotJson(_)) => {
                let text = line.trim();
                if text.starts_with('{') {
                    Vec::new()
                } else {
                    vec![Progress::Diagnostic(text.chars().take(PREVIEW_CHARS).collect())]
                }
            }
            Err(e) => {
                tracing::trace!(error = %e, "ignoring log line");
                Vec::new()
            }
        }
    }

    pub fn classify(&mut self, event: &Event) -> Vec<Progress> {
        let mut updates = Vec::new();
        match event {
            Event::System { subtype, model } => {
                if subtype.as_deref().unwrap_or("init") == "init" {
                    updates.push(Progress::SessionStarted {
                        model: model.clone(),
                    });
                }
            }
            Event::Assistant { message } => {
                self.turns += 1;
                updates.push(Progress::Turn(self.turns));
                if let Some(message) = message {
                    for block in message.content.blocks() {
                        if let ContentBlock::ToolUse { name, .. } = block {
                            updates.push(self.tool_started(name));
                        }
                    }
                    self.skills.extend(skill_invocations(message));
                }
            }
            Event::User { message, .. } => {
                let results = message.iter().flat_map(|m| m.content.blocks());
                for block in results {
                    if let ContentBlock::ToolResult { is_error } = block {
                        updates.push(self.tool_finished(*is_error));
                    }
                }
            }
            Event::ToolUse { name } => {
                updates.push(self.tool_started(name.as_deref().unwrap_or("unknown")));
            }
            Event::ToolResult { is_error } => updates.push(self.tool_finished(*is_error)),
            Event::Result {
                total_cost_usd,
                num_turns,
                usage,
            } => {
                self.stats = RunStats {
                    total_cost_usd: *total_cost_usd,
                    num_turns: *num_turns,
                    total_input_tokens: usage.map(|u| u.input_tokens),
                    total_output_tokens: usage.map(|u| u.output_tokens),
                };
            }
            Event::Unknown => {}
        }
        updates
    }

    fn tool_started(&mut self, name: &str) -> Progress {
        self.current_tool = Some(name.to_string());
        Progress::ToolStarted(name.to_string())
    }

    fn tool_finished(&mut self, is_error: bool) -> Progress {
        self.current_tool = None;
        Progress::ToolFinished { is_error }
    }

    pub fn turns(&self) -> u64 {
        self.turns
    }

    pub fn current_tool(&self) -> Option<&str> {
        self.current_tool.as_deref()
    }

    /// Lines fed so far, decodable or not.
    pub fn lines_seen(&self) -> u64 {
        self.lines_seen
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn skills(&self) -> &[SkillInvocation] {
        &self.skills
    }
}
