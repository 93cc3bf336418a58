//! Command execution abstraction with privilege escalation support.
//!
//! Every external tool (lsblk, e2fsck, lvreduce, mount, umount) is run through
//! [`CommandRunner`], which returns a [`CommandOutput`] that call sites must
//! inspect before proceeding.

use std::process::{Command, Output};

use tracing::{debug, trace};

use crate::error::{Error, IoResultExt, Result};

/// Exit status reported by pkexec when the user dismisses the dialog.
const PKEXEC_CANCELLED: i32 = 126;

/// Privilege escalation method for executing commands that require root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrivilegeEscalation {
    /// Execute directly without privilege escalation.
    #[default]
    None,
    /// Use `pkexec` for GUI-based privilege escalation (polkit).
    Pkexec,
    /// Use `sudo` for TTY-based privilege escalation.
    Sudo,
}

impl PrivilegeEscalation {
    fn wrapper(self) -> Option<&'static str> {
        match self {
            PrivilegeEscalation::None => None,
            PrivilegeEscalation::Pkexec => Some("pkexec"),
            PrivilegeEscalation::Sudo => Some("sudo"),
        }
    }
}

/// Structured result of one finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "the exit status of a command must be checked"]
pub struct CommandOutput {
    /// The command line, for diagnostics.
    pub command: String,
    /// Exit code, or None if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Builds an output from a captured [`Output`].
    pub fn from_output(command: impl Into<String>, output: Output) -> Self {
        Self {
            command: command.into(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }

    /// Returns true if the command exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code, with -1 standing in for death by signal.
    pub fn exit_code(&self) -> i32 {
        self.code.unwrap_or(-1)
    }

    /// Returns true when pkexec reported that authorization was dismissed.
    pub fn authentication_cancelled(&self) -> bool {
        self.code == Some(PKEXEC_CANCELLED)
    }

    /// Converts a non-zero exit into [`Error::CommandExit`].
    pub fn checked(self) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        if self.authentication_cancelled() {
            return Err(Error::AuthenticationCancelled);
        }
        Err(Error::CommandExit {
            code: self.exit_code(),
            command: self.command,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Runs external programs to completion.
pub trait CommandRunner {
    /// Runs `program` with `args` and captures its status and output.
    ///
    /// Returns an error only if the process could not be started; a non-zero
    /// exit is reported through [`CommandOutput`].
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Execution context for running system commands.
///
/// This struct holds the configuration for how commands should be executed,
/// particularly whether they need privilege escalation.
///
/// # Example
///
/// ```
/// use shrinkfs_core::executor::{ExecutionContext, PrivilegeEscalation};
///
/// // Default: no privilege escalation
/// let ctx = ExecutionContext::default();
///
/// // For terminal sessions of a non-root user
/// let tty_ctx = ExecutionContext::with_sudo();
/// assert_eq!(tty_ctx.escalation(), PrivilegeEscalation::Sudo);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    escalation: PrivilegeEscalation,
}

impl ExecutionContext {
    /// Creates a new execution context with no privilege escalation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an execution context that uses `pkexec` for privileged commands.
    pub fn with_pkexec() -> Self {
        Self {
            escalation: PrivilegeEscalation::Pkexec,
        }
    }

    /// Creates an execution context that uses `sudo` for privileged commands.
    pub fn with_sudo() -> Self {
        Self {
            escalation: PrivilegeEscalation::Sudo,
        }
    }

    /// Creates an execution context with a specific escalation method.
    pub fn with_escalation(escalation: PrivilegeEscalation) -> Self {
        Self { escalation }
    }

    /// Returns the current privilege escalation method.
    pub fn escalation(&self) -> PrivilegeEscalation {
        self.escalation
    }
}

impl CommandRunner for ExecutionContext {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let command_line = describe_command(self.escalation.wrapper(), program, args);
        debug!(command = %command_line, "running command");

        let output = match self.escalation.wrapper() {
            None => Command::new(program).args(args).output(),
            Some(wrapper) => Command::new(wrapper).arg(program).args(args).output(),
        }
        .command_context(&command_line)?;

        let output = CommandOutput::from_output(command_line, output);
        trace!(command = %output.command, code = ?output.code, "command finished");
        Ok(output)
    }
}

/// Formats a command line for logs and error messages.
fn describe_command(wrapper: Option<&str>, program: &str, args: &[&str]) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(args.len() + 2);
    parts.extend(wrapper);
    parts.push(program);
    parts.extend_from_slice(args);
    parts.join(" ")
}
