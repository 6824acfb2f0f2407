//! Agent invocation builder.
//!
//! The prompt is never placed on the command line itself: it is written to a
//! scratch file by [`PromptFile::prepare`] and substituted by the shell at
//! execution time, so arbitrarily large prompts and embedded quotes cannot
//! break the invocation.

use crate::config::AgentConfig;
use crate::variant::Variant;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// One argument of the agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Literal(String),
    /// Replaced by the contents of the file when the shell runs the command.
    FileContents(PathBuf),
}

/// Fully resolved invocation of the external agent.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    program: String,
    args: Vec<Arg>,
    output: PathBuf,
}

impl AgentCommand {
    /// Build the invocation for `variant`, reading the prompt from `prompt_file`
    /// and redirecting stdout+stderr into `output`.
    pub fn build(
        variant: Variant,
        agent: &AgentConfig,
        prompt_file: &Path,
        output: &Path,
    ) -> Self {
        let mut args = vec![
            Arg::Literal("-p".to_string()),
            Arg::FileContents(prompt_file.to_path_buf()),
        ];
        let mut flag = |name: &str| args.push(Arg::Literal(name.to_string()));

        if agent.skip_permissions {
            flag("--dangerously-skip-permissions");
        }
        flag("--verbose");
        flag("--output-format");
        flag("stream-json");
        if let Some(budget) = agent.max_budget_usd {
            flag("--max-budget-usd");
            flag(&budget.to_string());
        }
        if !agent.disallowed_tools.is_empty() {
            flag("--disallowedTools");
            flag(&agent.disallowed_tools.join(","));
        }
        if let Some(directive) = &agent.append_system_prompt {
            flag("--append-system-prompt");
            flag(directive);
        }
        if agent.strict_mcp_config {
            flag("--strict-mcp-config");
        }
        if variant.uses_plugin() {
            if let Some(dir) = &agent.plugin_dir {
                flag("--plugin-dir");
                flag(&dir.to_string_lossy());
            } else {
                tracing::warn!(%variant, "variant expects a plugin directory but none is configured");
            }
        }
        flag("--settings");
        flag(variant.settings_json());

        Self {
            program: agent.command.clone(),
            args,
            output: output.to_path_buf(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Argument list for display and logging. File-substituted arguments
    /// are shown as `@<path>`.
    pub fn display_args(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|a| match a {
                Arg::Literal(s) => s.clone(),
                Arg::FileContents(p) => format!("@{}", p.display()),
            }))
            .collect()
    }

    /// Single command line for `sh -c`, with every token quoted and output
    /// redirected to the log file.
    pub fn to_shell(&self) -> String {
        let mut parts = vec![shell_quote(&self.program)];
        for arg in &self.args {
            parts.push(match arg {
                Arg::Literal(s) => shell_quote(s),
                Arg::FileContents(p) => {
                    format!("\"$(cat {})\"", shell_quote(&p.to_string_lossy()))
                }
            });
        }
        format!(
            "{} < /dev/null > {} 2>&1",
            parts.join(" "),
            shell_quote(&self.output.to_string_lossy())
        )
    }
}

/// Quote `s` so the shell treats it as one literal token.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}

/// Scratch file holding the prompt for one run.
///
/// Dropping it removes the file as well, so the file is gone on every exit
/// path; [`PromptFile::cleanup`] does the same but reports errors.
#[derive(Debug)]
pub struct PromptFile {
    path: TempPath,
}

impl PromptFile {
    /// Write `prompt` to a new scratch file in the system temp directory.
    pub fn prepare(prompt: &str) -> std::io::Result<Self> {
        Self::prepare_in(&std::env::temp_dir(), prompt)
    }

    pub fn prepare_in(dir: &Path, prompt: &str) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("agent-bench-prompt-")
            .suffix(".md")
            .tempfile_in(dir)?;
        file.write_all(prompt.as_bytes())?;
        file.flush()?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the scratch file.
    pub fn cleanup(self) -> std::io::Result<()> {
        let path = self.path.to_path_buf();
        self.path.close()?;
        tracing::debug!(path = %path.display(), "removed prompt file");
        Ok(())
    }
}
