//! Harness configuration.
//!
//! Loaded from a TOML file where every section and field is optional, then
//! overridden by `LTP_*` environment variables and finally by CLI flags.
//!
//! ```toml
//! [node]
//! host = "10.0.0.4"
//! user = "azureuser"
//!
//! [suite]
//! tests = ["math", "fs"]
//! skip_tests = ["fs_bind"]
//! drive = "/dev/sdc"
//! ```

use node::SshConfig;
use provisioner::InstallConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// What to do with the log flags when a drive is given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrivePolicy {
    /// The drive flag replaces the result/output log flags.
    #[default]
    Replace,
    /// The drive flag is added next to the log flags.
    Additive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LtpConfig {
    pub result_log: String,
    pub output_log: String,
    pub skip_file: String,
    pub run_timeout_secs: u64,
    pub drive_policy: DrivePolicy,
}

impl Default for LtpConfig {
    fn default() -> Self {
        Self {
            result_log: "/opt/ltp/ltp-results.log".to_string(),
            output_log: "/opt/ltp/ltp-output.log".to_string(),
            skip_file: "/opt/ltp/skipfile".to_string(),
            run_timeout_secs: 12000,
            drive_policy: DrivePolicy::Replace,
        }
    }
}

impl LtpConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Empty means the default lite test set.
    pub tests: Vec<String>,
    pub skip_tests: Vec<String>,
    pub drive: Option<String>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            tests: Vec::new(),
            skip_tests: Vec::new(),
            drive: Some("/dev/sdc".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Where the text summary is written; nothing is written when unset.
    pub result_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub node: SshConfig,
    pub ltp: LtpConfig,
    pub install: InstallConfig,
    pub suite: SuiteConfig,
    pub report: ReportConfig,
}

/// Split a comma-separated list, dropping blank entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(content: &str, path: &Path) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    pub fn with_node(mut self, node: SshConfig) -> Self {
        self.node = node;
        self
    }

    pub fn with_tests(mut self, tests: Vec<String>) -> Self {
        self.suite.tests = tests;
        self
    }

    pub fn with_skip_tests(mut self, skip_tests: Vec<String>) -> Self {
        self.suite.skip_tests = skip_tests;
        self
    }

    pub fn with_drive(mut self, drive: Option<String>) -> Self {
        self.suite.drive = drive;
        self
    }

    pub fn with_result_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.report.result_file = Some(path.into());
        self
    }

    /// Apply `LTP_*` environment overrides through `get_env`.
    pub fn apply_env_overrides<F>(&mut self, get_env: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = get_env("LTP_NODE_HOST") {
            self.node.host = host;
        }
        if let Some(user) = get_env("LTP_NODE_USER") {
            self.node.user = user;
        }
        if let Some(port) = get_env("LTP_NODE_PORT") {
            self.node.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "LTP_NODE_PORT".to_string(),
                reason: format!("'{}' is not a port number", port),
            })?;
        }
        if let Some(tests) = get_env("LTP_TESTS") {
            self.suite.tests = split_list(&tests);
        }
        if let Some(skip_tests) = get_env("LTP_SKIP_TESTS") {
            self.suite.skip_tests = split_list(&skip_tests);
        }
        if let Some(drive) = get_env("LTP_DRIVE") {
            let drive = drive.trim().to_string();
            self.suite.drive = if drive.is_empty() { None } else { Some(drive) };
        }
        Ok(())
    }

    pub fn apply_process_env(&mut self) -> ConfigResult<()> {
        self.apply_env_overrides(|key| std::env::var(key).ok())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.node.validate().map_err(ConfigError::Validation)?;
        self.install.validate().map_err(ConfigError::Validation)?;

        for (field, path) in [
            ("ltp.result_log", &self.ltp.result_log),
            ("ltp.output_log", &self.ltp.output_log),
            ("ltp.skip_file", &self.ltp.skip_file),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("'{}' must be an absolute path", path),
                });
            }
        }

        if self.ltp.run_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ltp.run_timeout_secs".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if let Some(test) = self
            .suite
            .tests
            .iter()
            .chain(&self.suite.skip_tests)
            .find(|name| name.trim().is_empty() || name.contains(',') || name.contains('\n'))
        {
            return Err(ConfigError::InvalidValue {
                field: "suite".to_string(),
                reason: format!("invalid test name '{}'", test),
            });
        }

        Ok(())
    }
}
