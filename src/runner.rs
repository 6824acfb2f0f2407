/// Benchmark iteration loop.
///
/// Each iteration gets a fresh scratch project, one supervised agent session,
/// and a post-run metrics pass. Failures attributable to one run are reported
/// and the loop moves on; a shutdown request stops the loop.
use crate::artifacts;
use crate::classifier::{Classifier, Progress};
use crate::command::{AgentCommand, PromptFile};
use crate::compress;
use crate::config::BenchConfig;
use crate::results::{ResultsDir, ResultsError, RunResult};
use crate::session::{self, SessionError, SessionLimits, SessionOutcome};
use crate::signals::ShutdownFlag;
use crate::variant::Variant;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Exit status the shell uses when the agent binary cannot be found.
const COMMAND_NOT_FOUND: i32 = 127;

#[derive(Debug)]
pub enum RunError {
    /// Failed to read the task prompt.
    TaskFile {
        path: PathBuf,
        source: std::io::Error,
    },
    Results(ResultsError),
    /// Failed to create or initialize the scratch project.
    ScratchInit { path: PathBuf, reason: String },
    /// Failed to write the scratch prompt file.
    PromptFile { source: std::io::Error },
    /// The agent process could not be started.
    Launch(SessionError),
    /// The shell could not find the agent binary.
    AgentNotFound { command: String },
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::TaskFile { path, source } => {
                write!(f, "failed to read task file {}: {}", path.display(), source)
            }
            RunError::Results(e) => write!(f, "{e}"),
            RunError::ScratchInit { path, reason } => {
                write!(
                    f,
                    "failed to initialize scratch project {}: {}",
                    path.display(),
                    reason
                )
            }
            RunError::PromptFile { source } => {
                write!(f, "failed to write prompt file: {}", source)
            }
            RunError::Launch(e) => write!(f, "{e}"),
            RunError::AgentNotFound { command } => {
                write!(f, "agent command not found: {command}")
            }
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::TaskFile { source, .. } => Some(source),
            RunError::Results(e) => Some(e),
            RunError::ScratchInit { .. } => None,
            RunError::PromptFile { source } => Some(source),
            RunError::Launch(e) => Some(e),
            RunError::AgentNotFound { .. } => None,
        }
    }
}

pub struct BenchmarkRunner {
    config: BenchConfig,
    variant: Variant,
    iterations: u32,
    timestamp: String,
    results: ResultsDir,
    shutdown: ShutdownFlag,
}

impl BenchmarkRunner {
    pub fn new(
        mut config: BenchConfig,
        variant: Variant,
        iterations: u32,
        shutdown: ShutdownFlag,
    ) -> Self {
        config.absolutize_paths();
        let results = ResultsDir::new(&config.run.results_dir);
        Self {
            config,
            variant,
            iterations,
            timestamp: chrono::Local::now().format("%Y%m%d-%H%M%S").to_string(),
            results,
            shutdown,
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Run every iteration and return the completed results.
    ///
    /// Errors only for problems that affect every iteration alike (task file,
    /// results directory).
    pub async fn run(&self) -> Result<Vec<RunResult>, RunError> {
        self.results.init().map_err(RunError::Results)?;
        let task_path = &self.config.run.task_file;
        let task = std::fs::read_to_string(task_path).map_err(|e| RunError::TaskFile {
            path: task_path.clone(),
            source: e,
        })?;

        println!("{}", "=".repeat(50));
        println!("Agent Benchmark Runner");
        println!("{}", "=".repeat(50));
        println!("Variant:    {}", self.variant);
        println!("Iterations: {}", self.iterations);
        println!("Timestamp:  {}", self.timestamp);
        println!("{}", "=".repeat(50));

        let mut results = Vec::new();
        for iteration in 1..=self.iterations {
            if self.shutdown.is_triggered() {
                break;
            }
            match self.run_single(iteration, &task).await {
                Ok(Some(_)) if self.shutdown.is_triggered() => {
                    tracing::warn!(iteration, "shutdown requested, not saving result");
                }
                Ok(Some(result)) => {
                    match self.results.save(&result) {
                        Ok(path) => println!(
                            "   💾 Saved: {}",
                            path.file_name().unwrap_or_default().to_string_lossy()
                        ),
                        Err(e) => tracing::error!(error = %e, iteration, "failed to save run summary"),
                    }
                    results.push(result);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, iteration, "run failed");
                    println!("\n⚠️  Error: {e}");
                }
            }
        }

        if !results.is_empty() {
            println!("{}", self.summary(&results));
        }
        Ok(results)
    }

    /// One iteration. `Ok(None)` means the run was cut short by a timeout
    /// or shutdown and produced no result.
    async fn run_single(&self, iteration: u32, task: &str) -> Result<Option<RunResult>, RunError> {
        println!("\n{}", "=".repeat(50));
        println!("Run {} of {}", iteration, self.iterations);
        println!("{}", "=".repeat(50));

        let project_dir = self.create_scratch_project()?;
        println!("📁 Project: {}", project_dir.display());

        let prompt_text = self.variant.wrap_prompt(task);
        let prompt = match &self.config.run.prompt_dir {
            Some(dir) => PromptFile::prepare_in(dir, &prompt_text),
            None => PromptFile::prepare(&prompt_text),
        }
        .map_err(|e| RunError::PromptFile { source: e })?;

        let log_path = self.results.event_log(self.variant, &self.timestamp, iteration);
        let command = AgentCommand::build(self.variant, &self.config.agent, prompt.path(), &log_path);

        println!("🚀 Running: {}", self.variant);
        println!("{}", "-".repeat(50));

        let limits = SessionLimits {
            poll_interval: Duration::from_millis(self.config.run.poll_interval_ms),
            timeout: Duration::from_secs(self.config.run.timeout_secs),
        };
        let mut classifier = Classifier::new();
        let session = session::run_session(
            &command,
            &project_dir,
            limits,
            &self.shutdown,
            &mut classifier,
            print_progress,
        )
        .await;

        if let Err(e) = prompt.cleanup() {
            tracing::warn!(error = %e, "failed to remove prompt file");
        }
        let session = session.map_err(RunError::Launch)?;

        match session.outcome {
            SessionOutcome::Interrupted => {
                tracing::warn!(iteration, "run interrupted, discarding result");
                return Ok(None);
            }
            SessionOutcome::TimedOut => {
                println!("\n⚠️  Timeout!");
                tracing::warn!(
                    iteration,
                    timeout_secs = limits.timeout.as_secs(),
                    tool = ?classifier.current_tool(),
                    "run timed out, discarding result"
                );
                return Ok(None);
            }
            SessionOutcome::Exited {
                exit_code: Some(COMMAND_NOT_FOUND),
            } if session.output_bytes < 1024 && classifier.turns() == 0 => {
                return Err(RunError::AgentNotFound {
                    command: self.config.agent.command.clone(),
                });
            }
            SessionOutcome::Exited { exit_code } => {
                tracing::debug!(
                    iteration,
                    pid = session.pid,
                    log = %session.output_file.display(),
                    ?exit_code,
                    "agent exited"
                );
            }
        }
        println!("{}", "-".repeat(50));

        if self.config.run.compress_logs {
            if let Err(e) = compress::compress_log(&log_path) {
                tracing::warn!(error = %e, file = %log_path.display(), "failed to compress event log");
            }
        }

        let metrics = artifacts::collect(&project_dir, &self.config.metrics).await;
        if self.shutdown.is_triggered() {
            tracing::warn!(iteration, "interrupted while collecting metrics, discarding result");
            return Ok(None);
        }
        let skills: Vec<String> = classifier
            .skills()
            .iter()
            .filter_map(|s| s.skill.clone())
            .collect();
        let stats = classifier.stats().clone();
        let result = RunResult {
            variant: self.variant,
            iteration,
            timestamp: self.timestamp.clone(),
            duration_seconds: (session.duration.as_secs_f64() * 100.0).round() / 100.0,
            files_created: metrics.files_created,
            lines_of_code: metrics.lines_of_code,
            tests_pass: metrics.tests_pass,
            project_dir,
            total_cost_usd: stats.total_cost_usd,
            total_input_tokens: stats.total_input_tokens,
            total_output_tokens: stats.total_output_tokens,
            num_turns: stats.num_turns,
        };

        println!("\n✅ Complete!");
        println!("   ⏱️  Duration: {:.1}s", session.duration.as_secs_f64());
        println!("   📄 Files: {}", result.files_created);
        println!("   📝 LOC: {}", result.lines_of_code);
        println!("   🧪 Tests: {}", result.tests_pass);
        if let Some(cost) = result.total_cost_usd {
            println!("   💰 Cost: ${cost:.4}");
        }
        if let Some(turns) = result.num_turns {
            println!("   🔄 Turns: {turns}");
        }
        if !skills.is_empty() {
            println!("   🧩 Skills: {}", skills.join(", "));
        }

        Ok(Some(result))
    }

    /// Create the scratch project directory and initialize version control
    /// in it. The directory is kept after the run for inspection.
    fn create_scratch_project(&self) -> Result<PathBuf, RunError> {
        let root = self
            .config
            .run
            .scratch_root
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let scratch_err = |e: std::io::Error| RunError::ScratchInit {
            path: root.clone(),
            reason: e.to_string(),
        };
        std::fs::create_dir_all(&root).map_err(scratch_err)?;
        let dir = tempfile::Builder::new()
            .prefix(&self.config.run.scratch_prefix)
            .tempdir_in(&root)
            .map_err(scratch_err)?
            .keep();

        init_vcs(&dir, &self.config.run.vcs_init)?;
        for sub in &self.config.run.scaffold_dirs {
            std::fs::create_dir_all(dir.join(sub)).map_err(|e| RunError::ScratchInit {
                path: dir.join(sub),
                reason: e.to_string(),
            })?;
        }
        Ok(dir)
    }

    fn summary(&self, results: &[RunResult]) -> String {
        let mut lines = vec![
            format!("\n{}", "=".repeat(50)),
            "Summary".to_string(),
            "=".repeat(50),
            format!("Runs: {}", results.len()),
        ];
        let avg_duration =
            results.iter().map(|r| r.duration_seconds).sum::<f64>() / results.len() as f64;
        lines.push(format!("Avg Duration: {avg_duration:.1}s"));
        let costs: Vec<f64> = results.iter().filter_map(|r| r.total_cost_usd).collect();
        if !costs.is_empty() {
            let avg_cost = costs.iter().sum::<f64>() / costs.len() as f64;
            lines.push(format!("Avg Cost: ${avg_cost:.4}"));
        }
        lines.push(format!("Results: {}", self.results.root().display()));
        lines.join("\n")
    }
}

/// Run the version-control initializer inside `dir`.
fn init_vcs(dir: &Path, command: &[String]) -> Result<(), RunError> {
    let Some((program, args)) = command.split_first() else {
        return Ok(());
    };
    let status = std::process::Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(std::process::Stdio::null())
        .status()
        .map_err(|e| RunError::ScratchInit {
            path: dir.to_path_buf(),
            reason: format!("{program}: {e}"),
        })?;
    if !status.success() {
        return Err(RunError::ScratchInit {
            path: dir.to_path_buf(),
            reason: format!("{program} exited with {status}"),
        });
    }
    Ok(())
}

fn print_progress(update: &Progress) {
    if update.ends_line() {
        println!("{update}");
    } else {
        print!("{update}");
        let _ = std::io::stdout().flush();
    }
}
