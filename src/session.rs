/// Single session lifecycle: launch the agent through the shell with its
/// output redirected to the log file, tail that file while the agent runs,
/// and stop on exit, timeout, or shutdown.
use crate::classifier::{Classifier, Progress};
use crate::command::AgentCommand;
use crate::signals::ShutdownFlag;
use crate::tailer::LogTailer;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};

/// Poll loop settings.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub poll_interval: Duration,
    /// Overall wall-clock budget, measured from launch.
    pub timeout: Duration,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The agent exited on its own (exit code is None if killed by a signal).
    Exited { exit_code: Option<i32> },
    /// The time budget ran out and the agent was killed.
    TimedOut,
    /// Shutdown was requested and the agent was killed.
    Interrupted,
}

/// Result of a supervised session.
#[derive(Debug)]
pub struct SessionResult {
    pub outcome: SessionOutcome,
    /// Wall-clock duration of the session.
    pub duration: Duration,
    /// Total bytes read from the log file.
    pub output_bytes: u64,
    pub output_file: PathBuf,
    /// Child PID (for logging/diagnostics).
    pub pid: u32,
}

/// Errors that can occur during session execution.
#[derive(Debug)]
pub enum SessionError {
    /// Failed to create the log file.
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to spawn the agent subprocess.
    Spawn { source: std::io::Error },
    /// Failed to wait on the child or read the log.
    Io { source: std::io::Error },
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::LogFile { path, source } => {
                write!(f, "failed to create log file {}: {}", path.display(), source)
            }
            SessionError::Spawn { source } => {
                write!(f, "failed to spawn agent subprocess: {}", source)
            }
            SessionError::Io { source } => {
                write!(f, "I/O error during session: {}", source)
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::LogFile { source, .. } => Some(source),
            SessionError::Spawn { source } => Some(source),
            SessionError::Io { source } => Some(source),
        }
    }
}

/// Launch `command` in `cwd` and supervise it until it exits, times out, or
/// `shutdown` is raised. Every log line is fed to `classifier` in file order
/// and the resulting progress updates are passed to `on_progress`.
///
/// The agent gets its own process group so a kill also reaches anything it
/// spawned.
pub async fn run_session(
    command: &AgentCommand,
    cwd: &Path,
    limits: SessionLimits,
    shutdown: &ShutdownFlag,
    classifier: &mut Classifier,
    mut on_progress: impl FnMut(&Progress),
) -> Result<SessionResult, SessionError> {
    let output_path = command.output();
    // Create/truncate up front so the tailer never sees a stale log.
    std::fs::File::create(output_path).map_err(|e| SessionError::LogFile {
        path: output_path.to_path_buf(),
        source: e,
    })?;

    tracing::info!(
        args = ?command.display_args(),
        cwd = %cwd.display(),
        output = %output_path.display(),
        "spawning agent session"
    );

    let start = Instant::now();
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command.to_shell())
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0) // New process group for clean kill
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SessionError::Spawn { source: e })?;

    let pid = child.id().unwrap_or(0);
    tracing::info!(pid, "agent subprocess started");

    let mut tailer = LogTailer::new(output_path);
    let mut feed = |lines: Vec<String>| {
        for line in lines {
            for update in classifier.feed_line(&line) {
                on_progress(&update);
            }
        }
    };

    let outcome = loop {
        feed(tailer.poll().map_err(|e| SessionError::Io { source: e })?);

        if shutdown.is_triggered() {
            tracing::warn!(pid, "shutdown requested, killing agent session");
            kill_session(&mut child, pid).await;
            break SessionOutcome::Interrupted;
        }
        if start.elapsed() >= limits.timeout {
            tracing::warn!(
                pid,
                timeout_secs = limits.timeout.as_secs(),
                "agent session timed out, killing"
            );
            kill_session(&mut child, pid).await;
            break SessionOutcome::TimedOut;
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                // Final drain: lines written between the last poll and exit.
                feed(tailer.poll().map_err(|e| SessionError::Io { source: e })?);
                if let Some(rest) = tailer.finish() {
                    feed(vec![rest]);
                }
                break SessionOutcome::Exited {
                    exit_code: status.code(),
                };
            }
            Ok(None) => tokio::time::sleep(limits.poll_interval).await,
            Err(e) => return Err(SessionError::Io { source: e }),
        }
    };

    let duration = start.elapsed();
    tracing::info!(
        pid,
        outcome = ?outcome,
        output_bytes = tailer.offset(),
        lines = classifier.lines_seen(),
        duration_secs = duration.as_secs(),
        "agent session completed"
    );

    Ok(SessionResult {
        outcome,
        duration,
        output_bytes: tailer.offset(),
        output_file: tailer.path().to_path_buf(),
        pid,
    })
}

/// Kill the agent's process group and reap the child.
async fn kill_session(child: &mut Child, pid: u32) {
    if pid > 0 {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            tracing::debug!(pid, error = %e, "killpg failed, killing child directly");
        }
    }
    if let Err(e) = child.kill().await {
        tracing::debug!(pid, error = %e, "child already gone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::variant::Variant;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable script standing in for the agent binary.
    fn fake_agent(dir: &Path, body: &str) -> AgentConfig {
        let path = dir.join("fake-agent");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        AgentConfig {
            command: path.to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    fn limits(timeout_ms: u64) -> SessionLimits {
        SessionLimits {
            poll_interval: Duration::from_millis(20),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn command(dir: &Path, agent: &AgentConfig) -> AgentCommand {
        let prompt = dir.join("prompt.md");
        std::fs::write(&prompt, "do the thing").unwrap();
        AgentCommand::build(Variant::Native, agent, &prompt, &dir.join("log.jsonl"))
    }

    #[tokio::test]
    async fn test_session_streams_events_and_keeps_last_result() {
        let dir = tempfile::tempdir().unwrap();
        let agent = fake_agent(
            dir.path(),
            r#"echo '{"type":"system","subtype":"init"}'
echo '{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Write","input":{}}]}}'
sleep 0.1
echo 'plain diagnostic text'
echo '{"type":"result","total_cost_usd":1.23,"num_turns":4,"usage":{"input_tokens":100,"output_tokens":50}}'
echo '{"type":"result","total_cost_usd":2.0,"num_turns":7,"usage":{"input_tokens":300,"output_tokens":90}}'"#,
        );
        let cmd = command(dir.path(), &agent);
        let mut classifier = Classifier::new();
        let mut updates = Vec::new();

        let result = run_session(
            &cmd,
            dir.path(),
            limits(10_000),
            &ShutdownFlag::new(),
            &mut classifier,
            |p| updates.push(p.clone()),
        )
        .await
        .unwrap();

        assert_eq!(result.outcome, SessionOutcome::Exited { exit_code: Some(0) });
        assert!(result.pid > 0);
        assert_eq!(result.output_file, dir.path().join("log.jsonl"));
        assert_eq!(classifier.lines_seen(), 5);
        assert_eq!(classifier.stats().total_cost_usd, Some(2.0));
        assert_eq!(classifier.stats().num_turns, Some(7));
        assert!(updates.contains(&Progress::Turn(1)));
        assert!(updates.contains(&Progress::Diagnostic("plain diagnostic text".to_string())));
    }

    #[tokio::test]
    async fn test_session_receives_prompt_from_file() {
        let dir = tempfile::tempdir().unwrap();
        // $2 is the substituted prompt (after -p)
        let agent = fake_agent(dir.path(), r#"printf '%s\n' "$2""#);
        let cmd = command(dir.path(), &agent);
        let mut classifier = Classifier::new();

        run_session(
            &cmd,
            dir.path(),
            limits(10_000),
            &ShutdownFlag::new(),
            &mut classifier,
            |_| {},
        )
        .await
        .unwrap();

        let log = std::fs::read_to_string(dir.path().join("log.jsonl")).unwrap();
        assert_eq!(log, "do the thing\n");
    }

    #[tokio::test]
    async fn test_unterminated_final_line_is_processed() {
        let dir = tempfile::tempdir().unwrap();
        let agent = fake_agent(
            dir.path(),
            r#"printf '%s' '{"type":"result","num_turns":3}'"#,
        );
        let cmd = command(dir.path(), &agent);
        let mut classifier = Classifier::new();

        run_session(
            &cmd,
            dir.path(),
            limits(10_000),
            &ShutdownFlag::new(),
            &mut classifier,
            |_| {},
        )
        .await
        .unwrap();
        assert_eq!(classifier.stats().num_turns, Some(3));
    }

    #[tokio::test]
    async fn test_session_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let agent = fake_agent(dir.path(), "exit 42");
        let cmd = command(dir.path(), &agent);

        let result = run_session(
            &cmd,
            dir.path(),
            limits(10_000),
            &ShutdownFlag::new(),
            &mut Classifier::new(),
            |_| {},
        )
        .await
        .unwrap();
        assert_eq!(result.outcome, SessionOutcome::Exited { exit_code: Some(42) });
    }

    #[tokio::test]
    async fn test_session_timeout_kills_agent() {
        let dir = tempfile::tempdir().unwrap();
        let agent = fake_agent(dir.path(), "echo '{\"type\":\"assistant\"}'\nsleep 30");
        let cmd = command(dir.path(), &agent);
        let mut classifier = Classifier::new();

        let result = run_session(
            &cmd,
            dir.path(),
            limits(300),
            &ShutdownFlag::new(),
            &mut classifier,
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(result.outcome, SessionOutcome::TimedOut);
        assert!(result.duration.as_secs() < 5);
    }

    #[tokio::test]
    async fn test_session_interrupt_kills_agent() {
        let dir = tempfile::tempdir().unwrap();
        let agent = fake_agent(dir.path(), "sleep 30");
        let cmd = command(dir.path(), &agent);
        let shutdown = ShutdownFlag::new();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.trigger();
        });

        let result = run_session(
            &cmd,
            dir.path(),
            limits(10_000),
            &shutdown,
            &mut Classifier::new(),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(result.outcome, SessionOutcome::Interrupted);
        assert!(result.duration.as_secs() < 5);
    }

    #[tokio::test]
    async fn test_missing_agent_binary_exits_127() {
        let dir = tempfile::tempdir().unwrap();
        let agent = AgentConfig {
            command: "nonexistent-binary-xyz".to_string(),
            ..Default::default()
        };
        let cmd = command(dir.path(), &agent);

        let result = run_session(
            &cmd,
            dir.path(),
            limits(10_000),
            &ShutdownFlag::new(),
            &mut Classifier::new(),
            |_| {},
        )
        .await
        .unwrap();
        assert_eq!(result.outcome, SessionOutcome::Exited { exit_code: Some(127) });
    }

    #[tokio::test]
    async fn test_session_bad_cwd_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let agent = fake_agent(dir.path(), "true");
        let cmd = command(dir.path(), &agent);

        let err = run_session(
            &cmd,
            Path::new("/nonexistent-dir/impossible"),
            limits(10_000),
            &ShutdownFlag::new(),
            &mut Classifier::new(),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::Spawn { .. }));
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn test_session_bad_log_path() {
        let dir = tempfile::tempdir().unwrap();
        let agent = fake_agent(dir.path(), "true");
        let cmd = AgentCommand::build(
            Variant::Native,
            &agent,
            &dir.path().join("prompt.md"),
            Path::new("/nonexistent-dir/impossible/log.jsonl"),
        );

        let err = run_session(
            &cmd,
            dir.path(),
            limits(10_000),
            &ShutdownFlag::new(),
            &mut Classifier::new(),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::LogFile { .. }));
    }
}
