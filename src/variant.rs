use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A named configuration preset for the benchmarked agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// The agent with no plugins enabled.
    Native,
    /// Current plugin release, dispatched through `/devloop`.
    Optimized,
    /// Previous plugin release, onboarding first.
    Baseline,
    /// Plugin quick mode.
    Lite,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Native,
        Variant::Optimized,
        Variant::Baseline,
        Variant::Lite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Native => "native",
            Variant::Optimized => "optimized",
            Variant::Baseline => "baseline",
            Variant::Lite => "lite",
        }
    }

    /// Wrap the task text in this variant's prompt prefix.
    pub fn wrap_prompt(&self, task: &str) -> String {
        match self {
            Variant::Native => task.to_string(),
            Variant::Optimized => format!("/devloop {task}"),
            Variant::Baseline => format!("/devloop:onboard then {task}"),
            Variant::Lite => format!("/devloop:quick {task}"),
        }
    }

    /// Whether the plugin directory is attached to the invocation.
    pub fn uses_plugin(&self) -> bool {
        !matches!(self, Variant::Native)
    }

    /// Settings JSON passed with `--settings`.
    pub fn settings_json(&self) -> &'static str {
        if self.uses_plugin() {
            r#"{"enabledPlugins":{"devloop@local":true}}"#
        } else {
            r#"{"enabledPlugins":{}}"#
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown variant name given by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVariantError {
    pub name: String,
}

impl std::fmt::Display for ParseVariantError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let valid: Vec<&str> = Variant::ALL.iter().map(|v| v.as_str()).collect();
        write!(
            f,
            "Unknown variant: {}\nValid variants: {}",
            self.name,
            valid.join(", ")
        )
    }
}

impl std::error::Error for ParseVariantError {}

impl FromStr for Variant {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variant::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ParseVariantError {
                name: s.to_string(),
            })
    }
}
