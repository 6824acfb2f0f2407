use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Directive appended to the agent's system prompt so a benchmark run never
/// stalls waiting for a human answer.
pub const NO_QUESTIONS_PROMPT: &str = "CRITICAL: Never use AskUserQuestion tool. \
Never ask for clarification. Make reasonable assumptions and proceed. \
Complete the entire task autonomously.";

/// Top-level configuration loaded from bench.toml.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct BenchConfig {
    pub agent: AgentConfig,
    pub run: RunConfig,
    pub metrics: MetricsConfig,
    pub compare: CompareConfig,
}

/// Flags passed to the external agent on every invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub command: String,
    pub skip_permissions: bool,
    pub max_budget_usd: Option<f64>,
    pub disallowed_tools: Vec<String>,
    pub append_system_prompt: Option<String>,
    pub strict_mcp_config: bool,
    /// Plugin directory attached for the plugin-backed variants.
    pub plugin_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub task_file: PathBuf,
    pub results_dir: PathBuf,
    pub scratch_prefix: String,
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub vcs_init: Vec<String>,
    pub scaffold_dirs: Vec<PathBuf>,
    pub compress_logs: bool,
    /// Where prompt files are staged (system temp dir when unset).
    pub prompt_dir: Option<PathBuf>,
    /// Parent of the per-run scratch projects (system temp dir when unset).
    pub scratch_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub artifact_extensions: Vec<String>,
    pub source_extension: String,
    pub ignored_dirs: Vec<String>,
    pub manifest_file: String,
    pub test_command: Vec<String>,
    pub test_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    pub baseline: String,
}

// --- Default implementations ---

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            skip_permissions: true,
            max_budget_usd: Some(50.0),
            disallowed_tools: vec!["AskUserQuestion".to_string()],
            append_system_prompt: Some(NO_QUESTIONS_PROMPT.to_string()),
            strict_mcp_config: true,
            plugin_dir: None,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            task_file: PathBuf::from("task.md"),
            results_dir: PathBuf::from("results"),
            scratch_prefix: "agent-bench-".to_string(),
            timeout_secs: 1800,
            poll_interval_ms: 200,
            vcs_init: vec![
                "git".to_string(),
                "init".to_string(),
                "--quiet".to_string(),
            ],
            scaffold_dirs: vec![PathBuf::from("test")],
            compress_logs: false,
            prompt_dir: None,
            scratch_root: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            artifact_extensions: vec!["js".to_string(), "json".to_string(), "md".to_string()],
            source_extension: "js".to_string(),
            ignored_dirs: vec!["node_modules".to_string(), ".git".to_string()],
            manifest_file: "package.json".to_string(),
            test_command: vec!["npm".to_string(), "test".to_string()],
            test_timeout_secs: 60,
        }
    }
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            baseline: "native".to_string(),
        }
    }
}

/// Errors from loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl BenchConfig {
    /// Anchor every configured directory at the current working directory.
    ///
    /// The agent runs inside its scratch project, so any path that ends up on
    /// its command line must not depend on the runner's cwd.
    pub fn absolutize_paths(&mut self) {
        absolutize(&mut self.run.results_dir);
        absolutize(&mut self.run.task_file);
        for dir in [
            &mut self.run.prompt_dir,
            &mut self.run.scratch_root,
            &mut self.agent.plugin_dir,
        ]
        .into_iter()
        .flatten()
        {
            absolutize(dir);
        }
    }

    /// Load config from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

fn absolutize(path: &mut PathBuf) {
    match std::path::absolute(&*path) {
        Ok(abs) => *path = abs,
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot make path absolute"),
    }
}
