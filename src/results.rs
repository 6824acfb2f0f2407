/// Benchmark results directory: raw event logs and per-run summaries.
///
/// Summaries are written with the temp-file-then-rename pattern so a reader
/// never sees a partial file.
use crate::artifacts::TestOutcome;
use crate::variant::Variant;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Outcome of one supervised benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub variant: Variant,
    pub iteration: u32,
    pub timestamp: String,
    pub duration_seconds: f64,
    pub files_created: usize,
    pub lines_of_code: usize,
    pub tests_pass: TestOutcome,
    pub project_dir: PathBuf,
    // From the agent's final result event
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    #[serde(default)]
    pub total_input_tokens: Option<u64>,
    #[serde(default)]
    pub total_output_tokens: Option<u64>,
    #[serde(default)]
    pub num_turns: Option<u64>,
}

/// Errors from reading or writing the results directory.
#[derive(Debug)]
pub enum ResultsError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Serialize {
        source: serde_json::Error,
    },
}

impl std::fmt::Display for ResultsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultsError::Io { path, source } => {
                write!(f, "results I/O error at {}: {}", path.display(), source)
            }
            ResultsError::Serialize { source } => {
                write!(f, "failed to serialize run summary: {}", source)
            }
        }
    }
}

impl std::error::Error for ResultsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResultsError::Io { source, .. } => Some(source),
            ResultsError::Serialize { source } => Some(source),
        }
    }
}

/// Layout of the results directory.
#[derive(Debug, Clone)]
pub struct ResultsDir {
    root: PathBuf,
}

impl ResultsDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn init(&self) -> Result<(), ResultsError> {
        std::fs::create_dir_all(&self.root).map_err(|e| ResultsError::Io {
            path: self.root.clone(),
            source: e,
        })
    }

    /// Raw event log for one run (e.g. `native-20250101-120000-run1.jsonl`).
    pub fn event_log(&self, variant: Variant, timestamp: &str, iteration: u32) -> PathBuf {
        self.root
            .join(format!("{variant}-{timestamp}-run{iteration}.jsonl"))
    }

    /// Summary file for one run.
    pub fn summary_file(&self, variant: Variant, timestamp: &str, iteration: u32) -> PathBuf {
        self.root
            .join(format!("{variant}-{timestamp}-run{iteration}-summary.json"))
    }

    /// Persist a run summary. Returns the path written.
    pub fn save(&self, result: &RunResult) -> Result<PathBuf, ResultsError> {
        let path = self.summary_file(result.variant, &result.timestamp, result.iteration);
        let json = serde_json::to_string_pretty(result)
            .map_err(|e| ResultsError::Serialize { source: e })?;

        let tmp_path = self.root.join(format!(
            ".{}.tmp.{}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("summary"),
            std::process::id()
        ));
        std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| ResultsError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|e| ResultsError::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    /// Load every summary in the directory. Unreadable or malformed files
    /// are skipped with a warning.
    pub fn load_all(&self) -> Vec<RunResult> {
        let pattern = format!(
            "{}/*-summary.json",
            glob::Pattern::escape(&self.root.to_string_lossy())
        );
        let Ok(paths) = glob::glob(&pattern) else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for path in paths.flatten() {
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| {
                    serde_json::from_str::<RunResult>(&text).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(r) => results.push(r),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping unreadable summary");
                }
            }
        }
        results
    }
}

#[cfg(test)]
pub(crate) fn sample_result(variant: Variant, iteration: u32) -> RunResult {
    RunResult {
        variant,
        iteration,
        timestamp: "20250101-120000".to_string(),
        duration_seconds: 12.5,
        files_created: 4,
        lines_of_code: 120,
        tests_pass: TestOutcome::True,
        project_dir: PathBuf::from("/tmp/agent-bench-abc"),
        total_cost_usd: Some(0.75),
        total_input_tokens: Some(1000),
        total_output_tokens: Some(200),
        num_turns: Some(9),
    }
}
