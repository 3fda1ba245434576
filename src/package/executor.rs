//! The only I/O primitive the engine has: running an external command.

use anyhow::{Context, Result, bail};
use duct::cmd;

use super::PackageError;
use crate::common::shell::format_command;
use crate::ui::prelude::*;

/// Exit status plus whatever diagnostic text was captured.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait Executor {
    /// Run a command, letting the user see its progress. Only diagnostics are captured.
    fn run(&self, argv: &[String]) -> Result<CommandOutput>;

    /// Run a command and capture all of its output.
    fn read(&self, argv: &[String]) -> Result<CommandOutput>;

    /// Whether `program` is on PATH.
    fn program_exists(&self, program: &str) -> bool;

    /// True when commands are only printed, never executed.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Run `argv` and turn a non-zero exit into [`PackageError::CommandFailed`].
pub fn run_checked(executor: &dyn Executor, argv: &[String]) -> Result<()> {
    emit(
        Level::Debug,
        "package.exec",
        &format!("$ {}", format_command(argv)),
        None,
    );

    let result = executor.run(argv)?;
    if result.success() {
        Ok(())
    } else {
        Err(PackageError::CommandFailed {
            command: format_command(argv),
            code: result.code,
            output: result.output,
        }
        .into())
    }
}

/// Build an owned argv from string slices.
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts.into_iter().map(|s| s.as_ref().to_string()).collect()
}

/// Runs commands on the host through duct.
#[derive(Debug, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    fn split(argv: &[String]) -> Result<(&String, &[String])> {
        match argv.split_first() {
            Some(parts) => Ok(parts),
            None => bail!("refusing to run an empty command"),
        }
    }
}

impl Executor for SystemExecutor {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let (program, args) = Self::split(argv)?;
        let output = cmd(program, args)
            .stderr_capture()
            .unchecked()
            .run()
            .with_context(|| format!("Failed to start {}", program))?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        // Still surface the diagnostics the tool printed
        if !stderr.trim().is_empty() {
            eprint!("{}", stderr);
        }

        Ok(CommandOutput {
            code: output.status.code(),
            output: stderr,
        })
    }

    fn read(&self, argv: &[String]) -> Result<CommandOutput> {
        let (program, args) = Self::split(argv)?;
        let output = cmd(program, args)
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .run()
            .with_context(|| format!("Failed to start {}", program))?;

        Ok(CommandOutput {
            code: output.status.code(),
            output: String::from_utf8_lossy(&output.stdout).to_string(),
        })
    }

    fn program_exists(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Prints every command instead of running it and reports success.
#[derive(Debug, Default)]
pub struct DryRunExecutor;

impl Executor for DryRunExecutor {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        emit(
            Level::Info,
            "package.dry_run",
            &format!("[DRY RUN] {}", format_command(argv)),
            Some(serde_json::json!({ "argv": argv })),
        );
        Ok(CommandOutput {
            code: Some(0),
            output: String::new(),
        })
    }

    fn read(&self, _argv: &[String]) -> Result<CommandOutput> {
        // Queries return nothing so every repository looks disabled
        Ok(CommandOutput {
            code: Some(0),
            output: String::new(),
        })
    }

    fn program_exists(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
