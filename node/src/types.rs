use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;

/// A single command to run on a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecuteRequest {
    pub command: String,
    pub sudo: bool,
    /// Bypass the node's result cache for identical earlier invocations.
    pub force_run: bool,
    pub cwd: Option<String>,
    pub timeout: Option<Duration>,
}

impl ExecuteRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            sudo: false,
            force_run: false,
            cwd: None,
            timeout: None,
        }
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn with_force_run(mut self, force_run: bool) -> Self {
        self.force_run = force_run;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The shell line an executor actually runs: the working directory change
    /// and sudo elevation folded into one command string.
    pub fn command_line(&self) -> String {
        let body = match &self.cwd {
            Some(cwd) => format!("cd {} && {}", shell_quote(cwd), self.command),
            None => self.command.clone(),
        };

        if self.sudo {
            format!("sudo -n sh -c {}", shell_quote(&body))
        } else {
            body
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecuteResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
}

impl ExecuteResult {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            elapsed_ms: 0,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Quote a string for POSIX `sh`; safe strings pass through unchanged.
pub fn shell_quote(value: &str) -> String {
    shell_escape::unix::escape(Cow::Borrowed(value)).into_owned()
}
