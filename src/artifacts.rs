//! Post-run artifact metrics: generated files, lines of code, and whether the
//! generated project's tests pass.

use crate::config::MetricsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Outcome of running the generated project's tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    True,
    False,
    /// No manifest, so no test command was run.
    Unknown,
    /// The test command could not be launched or timed out.
    Error,
}

impl std::fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestOutcome::True => "true",
            TestOutcome::False => "false",
            TestOutcome::Unknown => "unknown",
            TestOutcome::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactMetrics {
    pub files_created: usize,
    pub lines_of_code: usize,
    pub tests_pass: TestOutcome,
}

/// Collect all metrics for the project at `project_dir`.
pub async fn collect(project_dir: &Path, config: &MetricsConfig) -> ArtifactMetrics {
    let files_created = config
        .artifact_extensions
        .iter()
        .map(|ext| files_with_extension(project_dir, ext, &config.ignored_dirs).len())
        .sum();
    let lines_of_code = count_lines(project_dir, &config.source_extension, &config.ignored_dirs);
    let tests_pass = if project_dir.join(&config.manifest_file).exists() {
        run_tests(
            project_dir,
            &config.test_command,
            Duration::from_secs(config.test_timeout_secs),
        )
        .await
    } else {
        TestOutcome::Unknown
    };

    ArtifactMetrics {
        files_created,
        lines_of_code,
        tests_pass,
    }
}

/// Files under `root` with extension `ext`, skipping any path that passes
/// through one of `ignored_dirs`.
pub fn files_with_extension(root: &Path, ext: &str, ignored_dirs: &[String]) -> Vec<PathBuf> {
    let pattern = format!(
        "{}/**/*.{}",
        glob::Pattern::escape(&root.to_string_lossy()),
        ext
    );
    let paths = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "invalid artifact pattern");
            return Vec::new();
        }
    };

    paths
        .flatten()
        .filter(|p| p.is_file())
        .filter(|p| {
            let rel = p.strip_prefix(root).unwrap_or(p);
            !rel.components().any(|c| {
                ignored_dirs
                    .iter()
                    .any(|d| c.as_os_str() == std::ffi::OsStr::new(d))
            })
        })
        .collect()
}

/// Total line count across source files. Unreadable files are skipped.
pub fn count_lines(root: &Path, ext: &str, ignored_dirs: &[String]) -> usize {
    files_with_extension(root, ext, ignored_dirs)
        .iter()
        .filter_map(|p| match std::fs::read_to_string(p) {
            Ok(text) => Some(text.lines().count()),
            Err(e) => {
                tracing::debug!(file = %p.display(), error = %e, "skipping unreadable source file");
                None
            }
        })
        .sum()
}

/// Run `command` in `dir` with a hard timeout. The process is killed if the
/// timeout expires.
pub async fn run_tests(dir: &Path, command: &[String], timeout: Duration) -> TestOutcome {
    let Some((program, args)) = command.split_first() else {
        tracing::warn!("empty test command");
        return TestOutcome::Error;
    };

    let child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let child = match child {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(command = %program, error = %e, "failed to launch test command");
            return TestOutcome::Error;
        }
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            tracing::debug!(exit_code = ?output.status.code(), "test command finished");
            if output.status.success() {
                TestOutcome::True
            } else {
                TestOutcome::False
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "failed waiting for test command");
            TestOutcome::Error
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "test command timed out, killed"
            );
            TestOutcome::Error
        }
    }
}
