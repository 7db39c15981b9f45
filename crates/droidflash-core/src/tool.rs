//! External control tool invocation
//!
//! droidflash talks to devices exclusively through two command-line tools:
//! a primary one that works while Android is running (adb) and a fallback one
//! that works when only the bootloader answers (fastboot). Both are reached
//! through the `CommandRunner` trait so tests and the simulator can stand in
//! for real hardware.

use crate::config::ToolsConfig;
use crate::error::{CommandError, MissingTool, ToolMissing};
use std::process::Command;
use std::sync::Arc;

/// Captured result of one external program invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Whether the program exited with status 0
    pub success: bool,
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

impl ToolOutput {
    /// Trimmed stdout if the program succeeded and printed something
    pub fn value(&self) -> Option<&str> {
        let out = self.stdout.trim();
        (self.success && !out.is_empty()).then_some(out)
    }

    /// Best diagnostic text: stderr if present, otherwise stdout
    pub fn detail(&self) -> String {
        let err = self.stderr.trim();
        if err.is_empty() {
            self.stdout.trim().to_string()
        } else {
            err.to_string()
        }
    }
}

/// Runs an external program to completion
///
/// Implementations must drain the program's output and release the process
/// before returning, on every path.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output
    fn run(&self, program: &str, args: &[&str]) -> Result<ToolOutput, CommandError>;
}

/// Runs programs on the host with `std::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<ToolOutput, CommandError> {
        log::trace!("exec: {} {}", program, args.join(" "));

        // output() waits for exit and collects both pipes
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let result = ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success {
            log::debug!("{} exited with {}: {}", program, output.status, result.detail());
        }

        Ok(result)
    }
}

/// The pair of control tools, bound to a runner
#[derive(Clone)]
pub struct ControlTools {
    runner: Arc<dyn CommandRunner>,
    primary: String,
    fallback: String,
}

impl ControlTools {
    /// Bind the configured tools to an arbitrary runner
    pub fn new(runner: Arc<dyn CommandRunner>, config: &ToolsConfig) -> Self {
        Self {
            runner,
            primary: config.primary.clone(),
            fallback: config.fallback.clone(),
        }
    }

    /// Bind the configured tools to the host's process runner
    pub fn system(config: &ToolsConfig) -> Self {
        Self::new(Arc::new(SystemRunner), config)
    }

    /// The underlying runner, for backends that run their own programs
    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.runner)
    }

    /// Primary tool program name
    pub fn primary_program(&self) -> &str {
        &self.primary
    }

    /// Fallback tool program name
    pub fn fallback_program(&self) -> &str {
        &self.fallback
    }

    /// Invoke the primary tool
    pub fn primary(&self, args: &[&str]) -> Result<ToolOutput, CommandError> {
        self.runner.run(&self.primary, args)
    }

    /// Invoke the fallback tool
    pub fn fallback(&self, args: &[&str]) -> Result<ToolOutput, CommandError> {
        self.runner.run(&self.fallback, args)
    }

    /// Invoke the primary tool against one device
    pub fn primary_for(&self, id: &str, args: &[&str]) -> Result<ToolOutput, CommandError> {
        let mut full = vec!["-s", id];
        full.extend_from_slice(args);
        self.primary(&full)
    }

    /// Invoke the fallback tool against one device
    pub fn fallback_for(&self, id: &str, args: &[&str]) -> Result<ToolOutput, CommandError> {
        let mut full = vec!["-s", id];
        full.extend_from_slice(args);
        self.fallback(&full)
    }

    /// Verify that both tools are installed and runnable
    ///
    /// Each tool is asked for its version; a spawn failure or a non-zero exit
    /// counts as missing.
    pub fn check(&self) -> Result<(), ToolMissing> {
        let primary_ok = answers(self.primary(&["version"]), &self.primary);
        let fallback_ok = answers(self.fallback(&["--version"]), &self.fallback);

        let which = match (primary_ok, fallback_ok) {
            (true, true) => {
                log::debug!("control tools available: {}, {}", self.primary, self.fallback);
                return Ok(());
            }
            (false, true) => MissingTool::Primary,
            (true, false) => MissingTool::Fallback,
            (false, false) => MissingTool::Both,
        };

        log::warn!("tool check failed: {}", which);
        Err(ToolMissing { which })
    }
}

fn answers(result: Result<ToolOutput, CommandError>, program: &str) -> bool {
    match result {
        Ok(output) => output.success,
        Err(e) => {
            log::debug!("{} did not answer: {}", program, e);
            false
        }
    }
}
