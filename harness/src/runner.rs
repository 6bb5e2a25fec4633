//! Runs `runltp` on a node and turns its result log into [`LtpResult`]s.

use crate::config::{DrivePolicy, LtpConfig};
use crate::parser::{ParseError, ResultParser};
use crate::result::LtpResult;
use node::{shell_quote, ExecuteRequest, Node, NodeError};
use provisioner::{LtpInstaller, ProvisionError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum LtpError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to parse LTP results: {0}")]
    Parse(#[from] ParseError),

    #[error("Execution failed: {0}")]
    Execution(#[from] NodeError),

    #[error("Provisioning failed: {0}")]
    Provision(#[from] ProvisionError),
}

pub type RunResult<T> = Result<T, LtpError>;

/// How `runltp` is told where to log and which device to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationMode {
    /// Per-test logging to explicit result and output files.
    Logged {
        result_log: String,
        output_log: String,
    },
    /// Target a block device; no log file flags are passed.
    Drive { device: String },
    /// Target a block device and keep the log file flags.
    LoggedDrive {
        result_log: String,
        output_log: String,
        device: String,
    },
}

impl InvocationMode {
    pub fn select(config: &LtpConfig, drive: Option<&str>) -> Self {
        match (drive, config.drive_policy) {
            (None, _) => InvocationMode::Logged {
                result_log: config.result_log.clone(),
                output_log: config.output_log.clone(),
            },
            (Some(device), DrivePolicy::Replace) => InvocationMode::Drive {
                device: device.to_string(),
            },
            (Some(device), DrivePolicy::Additive) => InvocationMode::LoggedDrive {
                result_log: config.result_log.clone(),
                output_log: config.output_log.clone(),
                device: device.to_string(),
            },
        }
    }

    fn push_flags(&self, args: &mut Vec<String>) {
        match self {
            InvocationMode::Logged {
                result_log,
                output_log,
            } => push_log_flags(args, result_log, output_log),
            InvocationMode::Drive { device } => {
                args.extend(["-z".to_string(), shell_quote(device)]);
            }
            InvocationMode::LoggedDrive {
                result_log,
                output_log,
                device,
            } => {
                push_log_flags(args, result_log, output_log);
                args.extend(["-z".to_string(), shell_quote(device)]);
            }
        }
    }
}

fn push_log_flags(args: &mut Vec<String>, result_log: &str, output_log: &str) {
    args.extend([
        "-p".to_string(),
        "-q".to_string(),
        "-l".to_string(),
        shell_quote(result_log),
        "-o".to_string(),
        shell_quote(output_log),
    ]);
}

/// The full `runltp` argument string.
pub fn build_arguments(mode: &InvocationMode, tests: &[String], skip_file: Option<&str>) -> String {
    let mut args = Vec::new();
    mode.push_flags(&mut args);
    args.push("-f".to_string());
    args.push(shell_quote(&tests.join(",")));
    if let Some(skip_file) = skip_file {
        args.push("-S".to_string());
        args.push(shell_quote(skip_file));
    }
    args.join(" ")
}

/// Skip file content: one test per line, no trailing newline.
pub fn skip_file_content(skip_tests: &[String]) -> Option<String> {
    if skip_tests.is_empty() {
        None
    } else {
        Some(skip_tests.join("\n"))
    }
}

pub struct LtpRunner {
    node: Arc<Node>,
    config: LtpConfig,
    installer: LtpInstaller,
    parser: ResultParser,
}

impl LtpRunner {
    pub fn new(node: Arc<Node>, config: LtpConfig, installer: LtpInstaller) -> Self {
        let parser = ResultParser::new(installer.config().git_tag.clone());
        Self {
            node,
            config,
            installer,
            parser,
        }
    }

    pub fn config(&self) -> &LtpConfig {
        &self.config
    }

    pub fn binary_path(&self) -> String {
        self.installer.config().binary_path()
    }

    pub async fn ensure_installed(&self) -> RunResult<()> {
        if self.installer.is_installed(&self.node).await? {
            debug!("LTP already installed at {}", self.binary_path());
            return Ok(());
        }
        self.installer.install(&self.node).await?;
        Ok(())
    }

    pub async fn run_test(
        &self,
        tests: &[String],
        skip_tests: &[String],
        drive: Option<&str>,
    ) -> RunResult<Vec<LtpResult>> {
        if tests.is_empty() {
            return Err(LtpError::InvalidArgument(
                "ltp tests cannot be empty".to_string(),
            ));
        }

        self.ensure_installed().await?;
        self.remove_stale_files().await?;

        let mode = InvocationMode::select(&self.config, drive);
        let skip_file = match skip_file_content(skip_tests) {
            Some(content) => {
                debug!("Writing {} skipped tests to {}", skip_tests.len(), self.config.skip_file);
                self.node
                    .write_file(&self.config.skip_file, &content, true)
                    .await?;
                Some(self.config.skip_file.as_str())
            }
            None => None,
        };

        let arguments = build_arguments(&mode, tests, skip_file);
        info!("Running LTP: {} {}", self.binary_path(), arguments);
        let request = ExecuteRequest::new(format!("{} {}", self.binary_path(), arguments))
            .with_sudo(true)
            .with_force_run(true)
            .with_timeout(self.config.run_timeout());
        let result = self.node.execute(request).await?;

        // Sub-test failures are reported through the log, not the exit code.
        if !result.success() {
            warn!("runltp exited with code {}", result.exit_code);
        }

        self.parse_results().await
    }

    pub async fn parse_results(&self) -> RunResult<Vec<LtpResult>> {
        let log = self
            .node
            .read_file(&self.config.result_log, true, true)
            .await?;
        let results = self.parser.parse(&log)?;
        info!("Parsed {} LTP results", results.len());
        Ok(results)
    }

    pub async fn read_output_log(&self) -> RunResult<String> {
        Ok(self
            .node
            .read_file(&self.config.output_log, true, true)
            .await?)
    }

    async fn remove_stale_files(&self) -> RunResult<()> {
        for path in [
            &self.config.skip_file,
            &self.config.result_log,
            &self.config.output_log,
        ] {
            debug!("Removing {}", path);
            self.node.remove_file(path, true).await?;
        }
        Ok(())
    }
}
