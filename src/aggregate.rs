//! Offline token usage breakdown for a completed agent log.
//!
//! Replays the log in order, attributing assistant turns to the main session
//! and tool results that carry their own `agentId` + `usage` to that
//! sub-agent. Records that fail to decode are skipped.

use crate::events::{skill_invocations, ContentBlock, Event, SkillInvocation, TokenUsage};
use crate::usage::{PricingTier, UsageLedger};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const DESCRIPTION_MAX_CHARS: usize = 60;

/// Usage broken down by agent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageReport {
    pub main: UsageLedger,
    pub subagents: BTreeMap<String, UsageLedger>,
    pub skills: Vec<SkillInvocation>,
}

/// Errors that stop an aggregation pass. Bad records never do.
#[derive(Debug)]
pub enum AggregateError {
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateError::Open { path, source } => {
                write!(f, "failed to open session file {}: {}", path.display(), source)
            }
            AggregateError::Read { path, source } => {
                write!(f, "failed to read session file {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AggregateError::Open { source, .. } => Some(source),
            AggregateError::Read { source, .. } => Some(source),
        }
    }
}

impl UsageReport {
    /// Aggregate a log file. `.zst` files are decompressed on the fly.
    pub fn from_file(path: &Path) -> Result<Self, AggregateError> {
        let file = std::fs::File::open(path).map_err(|e| AggregateError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        let result = if path.extension().is_some_and(|ext| ext == "zst") {
            let decoder = zstd::Decoder::new(file).map_err(|e| AggregateError::Open {
                path: path.to_path_buf(),
                source: e,
            })?;
            Self::from_reader(BufReader::new(decoder))
        } else {
            Self::from_reader(BufReader::new(file))
        };
        result.map_err(|e| AggregateError::Read {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Aggregate every line of `reader`, in order.
    pub fn from_reader<R: BufRead>(mut reader: R) -> std::io::Result<Self> {
        let mut report = Self::default();
        let mut buf = Vec::new();
        let mut skipped = 0u64;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            if !report.record_line(&line) && !line.trim().is_empty() {
                skipped += 1;
            }
        }
        if skipped > 0 {
            tracing::debug!(skipped, "skipped undecodable records");
        }
        Ok(report)
    }

    /// Fold one log line into the report. Returns false if the line could
    /// not be decoded.
    pub fn record_line(&mut self, line: &str) -> bool {
        match Event::decode(line) {
            Ok(event) => {
                self.record(&event);
                true
            }
            Err(_) => false,
        }
    }

    pub fn record(&mut self, event: &Event) {
        match event {
            Event::Assistant {
                message: Some(message),
            } => {
                self.main.messages = self.main.messages.saturating_add(1);
                if let Some(usage) = &message.usage {
                    self.main.add_usage(usage);
                }
                let tool_calls = message
                    .content
                    .blocks()
                    .iter()
                    .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
                    .count() as u64;
                self.main.tool_calls = self.main.tool_calls.saturating_add(tool_calls);
                self.skills.extend(skill_invocations(message));
            }
            Event::User {
                tool_use_result: Some(result),
                ..
            } => self.record_agent_result(result),
            _ => {}
        }
    }

    fn record_agent_result(&mut self, result: &Value) {
        let (Some(agent_id), Some(usage)) = (result.get("agentId"), result.get("usage")) else {
            return;
        };
        let Ok(usage) = TokenUsage::deserialize(usage) else {
            return;
        };
        let agent_id = match agent_id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let ledger = self.subagents.entry(agent_id.clone()).or_default();
        let description = result
            .get("description")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .map(|d| d.chars().take(DESCRIPTION_MAX_CHARS).collect())
            .unwrap_or_else(|| format!("agent-{agent_id}"));
        let agent_type = result
            .get("subagent_type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        ledger.label_once(description, agent_type);
        ledger.messages = ledger.messages.saturating_add(1);
        ledger.add_usage(&usage);
    }

    /// Fold a report for a later part of the same log into this one.
    pub fn merge(&mut self, other: UsageReport) {
        self.main.add_counters(&other.main);
        for (id, theirs) in other.subagents {
            let ours = self.subagents.entry(id).or_default();
            if ours.description.is_none() {
                ours.description = theirs.description.clone();
                ours.agent_type = theirs.agent_type.clone();
            }
            ours.add_counters(&theirs);
        }
        self.skills.extend(other.skills);
    }

    /// Counters summed over the main session and every sub-agent.
    pub fn totals(&self) -> UsageLedger {
        let mut totals = UsageLedger::default();
        totals.add_counters(&self.main);
        for ledger in self.subagents.values() {
            totals.add_counters(ledger);
        }
        totals
    }

    pub fn to_json(&self, tier: PricingTier) -> Value {
        #[derive(Serialize)]
        struct Totals {
            #[serde(flatten)]
            usage: UsageLedger,
            estimated_cost_usd: f64,
        }

        #[derive(Serialize)]
        struct Report<'a> {
            main_session: &'a UsageLedger,
            subagents: &'a BTreeMap<String, UsageLedger>,
            skill_invocations: &'a [SkillInvocation],
            totals: Totals,
        }

        let totals = self.totals();
        let cost = totals.cost(tier.rates());
        let report = Report {
            main_session: &self.main,
            subagents: &self.subagents,
            skill_invocations: &self.skills,
            totals: Totals {
                usage: totals,
                estimated_cost_usd: (cost * 10_000.0).round() / 10_000.0,
            },
        };
        serde_json::to_value(report).unwrap_or(Value::Null)
    }

    pub fn render_table(&self, tier: PricingTier) -> String {
        let rates = tier.rates();
        let rule = "-".repeat(110);
        let mut out = String::new();

        let _ = writeln!(out, "{}", "=".repeat(110));
        let _ = writeln!(out, "TOKEN USAGE ANALYSIS");
        let _ = writeln!(out, "{}\n", "=".repeat(110));
        let _ = writeln!(out, "Usage Breakdown:");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(
            out,
            "{:<15} {:<12} {:<30} {:>5} {:>12} {:>10} {:>10} {:>8}",
            "Agent", "Type", "Description", "Msgs", "Input", "Output", "Cache", "Cost"
        );
        let _ = writeln!(out, "{rule}");

        let mut row = |id: &str, kind: &str, desc: &str, ledger: &UsageLedger| {
            let _ = writeln!(
                out,
                "{:<15} {:<12} {:<30} {:>5} {:>12} {:>10} {:>10} ${:>7.2}",
                id,
                kind,
                desc,
                ledger.messages,
                format_tokens(ledger.input_tokens),
                format_tokens(ledger.output_tokens),
                format_tokens(ledger.cache_read),
                ledger.cost(rates)
            );
        };
        row("main", "coordinator", "Main session", &self.main);
        for (id, ledger) in &self.subagents {
            let fallback = format!("agent-{id}");
            row(
                id,
                ledger.agent_type.as_deref().unwrap_or("unknown"),
                ledger.description.as_deref().unwrap_or(&fallback),
                ledger,
            );
        }
        let _ = writeln!(out, "{rule}");

        if !self.skills.is_empty() {
            let _ = writeln!(out, "\nSkill Invocations:");
            let _ = writeln!(out, "{}", "-".repeat(50));
            for inv in &self.skills {
                let name = inv.skill.as_deref().unwrap_or("(unnamed)");
                match inv.args.as_deref().filter(|a| !a.is_empty()) {
                    Some(args) => {
                        let _ = writeln!(out, "  - {name} (args: {args})");
                    }
                    None => {
                        let _ = writeln!(out, "  - {name}");
                    }
                }
            }
            let _ = writeln!(out, "{}", "-".repeat(50));
        }

        let totals = self.totals();
        let _ = writeln!(out, "\nTOTALS:");
        let _ = writeln!(out, "  Total messages:         {}", format_tokens(totals.messages));
        let _ = writeln!(out, "  Total tool calls:       {}", format_tokens(totals.tool_calls));
        let _ = writeln!(out, "  Input tokens:           {}", format_tokens(totals.input_tokens));
        let _ = writeln!(out, "  Output tokens:          {}", format_tokens(totals.output_tokens));
        let _ = writeln!(out, "  Cache creation tokens:  {}", format_tokens(totals.cache_creation));
        let _ = writeln!(out, "  Cache read tokens:      {}", format_tokens(totals.cache_read));
        let _ = writeln!(out);
        let _ = writeln!(out, "  Total input (incl cache): {}", format_tokens(totals.total_input()));
        let _ = writeln!(out, "  Total tokens:             {}", format_tokens(totals.total_tokens()));
        let _ = writeln!(out);
        let _ = writeln!(out, "  Estimated cost: ${:.2}", totals.cost(rates));
        let _ = writeln!(
            out,
            "  (at ${}/${} per M tokens for input/output - {} rates)",
            rates.input_per_million,
            rates.output_per_million,
            tier.label()
        );
        let _ = writeln!(out, "\n{}", "=".repeat(110));
        out
    }
}

/// Format a count with thousands separators.
pub fn format_tokens(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
