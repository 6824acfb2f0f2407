//! Token usage ledgers and cost estimation.

use crate::events::TokenUsage;
use serde::Serialize;

/// Per-agent usage accumulator.
///
/// `description` and `agent_type` are set once, from the first result seen
/// for the agent; later results only add to the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageLedger {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
    pub messages: u64,
    pub tool_calls: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
}

impl UsageLedger {
    pub fn add_usage(&mut self, usage: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(usage.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(usage.output_tokens);
        self.cache_creation = self
            .cache_creation
            .saturating_add(usage.cache_creation_input_tokens);
        self.cache_read = self.cache_read.saturating_add(usage.cache_read_input_tokens);
    }

    /// Set description and type unless already set.
    pub fn label_once(&mut self, description: String, agent_type: String) {
        if self.description.is_none() {
            self.description = Some(description);
            self.agent_type = Some(agent_type);
        }
    }

    /// Add another ledger's counters. Labels are left alone.
    pub fn add_counters(&mut self, other: &UsageLedger) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.cache_creation = self.cache_creation.saturating_add(other.cache_creation);
        self.cache_read = self.cache_read.saturating_add(other.cache_read);
        self.messages = self.messages.saturating_add(other.messages);
        self.tool_calls = self.tool_calls.saturating_add(other.tool_calls);
    }

    /// Prompt tokens including both cache kinds.
    pub fn total_input(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.cache_creation)
            .saturating_add(self.cache_read)
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_input().saturating_add(self.output_tokens)
    }

    pub fn cost(&self, rates: CostRates) -> f64 {
        rates.estimate(self.total_input(), self.output_tokens)
    }
}

/// Per-million-token prices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostRates {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl CostRates {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// `input` covers prompt, cache-creation and cache-read tokens combined.
    pub fn estimate(&self, input: u64, output: u64) -> f64 {
        input as f64 * self.input_per_million / 1_000_000.0
            + output as f64 * self.output_per_million / 1_000_000.0
    }
}

/// Named rate presets. The caller picks one; nothing is inferred from the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PricingTier {
    #[default]
    Sonnet,
    Opus,
}

impl PricingTier {
    pub fn rates(&self) -> CostRates {
        match self {
            PricingTier::Sonnet => CostRates::new(3.0, 15.0),
            PricingTier::Opus => CostRates::new(15.0, 75.0),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PricingTier::Sonnet => "Sonnet",
            PricingTier::Opus => "Opus",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_one_million_each() {
        let ledger = UsageLedger {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
            ..Default::default()
        };
        let cost = ledger.cost(CostRates::new(3.0, 15.0));
        assert!((cost - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_cache_tokens_billed_at_input_rate() {
        let ledger = UsageLedger {
            input_tokens: 100_000,
            cache_creation: 200_000,
            cache_read: 700_000,
            ..Default::default()
        };
        assert_eq!(ledger.total_input(), 1_000_000);
        let cost = ledger.cost(PricingTier::Sonnet.rates());
        assert!((cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_opus_tier_is_pricier() {
        let ledger = UsageLedger {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
            ..Default::default()
        };
        assert!((ledger.cost(PricingTier::Opus.rates()) - 90.0).abs() < 1e-9);
        assert_eq!(PricingTier::default(), PricingTier::Sonnet);
    }

    #[test]
    fn test_label_once_keeps_first() {
        let mut ledger = UsageLedger::default();
        ledger.label_once("write tests".to_string(), "qa".to_string());
        ledger.label_once("other".to_string(), "general".to_string());
        assert_eq!(ledger.description.as_deref(), Some("write tests"));
        assert_eq!(ledger.agent_type.as_deref(), Some("qa"));
    }

    #[test]
    fn test_add_usage_and_counters() {
        let mut a = UsageLedger::default();
        a.add_usage(&TokenUsage {
            input_tokens: 1,
            output_tokens: 2,
            cache_creation_input_tokens: 3,
            cache_read_input_tokens: 4,
        });
        a.messages = 1;

        let mut b = a.clone();
        b.tool_calls = 5;
        b.description = Some("b".to_string());
        a.add_counters(&b);

        assert_eq!(a.input_tokens, 2);
        assert_eq!(a.output_tokens, 4);
        assert_eq!(a.cache_creation, 6);
        assert_eq!(a.cache_read, 8);
        assert_eq!(a.messages, 2);
        assert_eq!(a.tool_calls, 5);
        assert!(a.description.is_none());
        assert_eq!(a.total_tokens(), 20);
    }

    #[test]
    fn test_counters_saturate_instead_of_overflowing() {
        let mut ledger = UsageLedger::default();
        ledger.add_usage(&TokenUsage {
            input_tokens: u64::MAX,
            output_tokens: 1,
            cache_creation_input_tokens: 0,
            cache_read_input_tokens: 0,
        });
        ledger.add_usage(&TokenUsage {
            input_tokens: 1,
            cache_read_input_tokens: 10,
            ..Default::default()
        });
        assert_eq!(ledger.input_tokens, u64::MAX);
        assert_eq!(ledger.cache_read, 10);
        assert_eq!(ledger.total_input(), u64::MAX);
        assert_eq!(ledger.total_tokens(), u64::MAX);

        let mut totals = ledger.clone();
        totals.add_counters(&ledger);
        assert_eq!(totals.input_tokens, u64::MAX);
        assert_eq!(totals.output_tokens, 2);
        assert!(totals.cost(PricingTier::Opus.rates()).is_finite());
    }
}
