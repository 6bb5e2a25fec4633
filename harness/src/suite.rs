//! The `ltp-lite` suite: run a small LTP selection and fail on any failed test.

use crate::config::{split_list, SuiteConfig};
use crate::notifier::{NotifierError, NotifierHub, TestResultMessage};
use crate::result::{failed_test_names, LtpResult};
use crate::runner::{LtpError, LtpRunner};
use thiserror::Error;
use tracing::{info, warn};

pub const SUITE_NAME: &str = "LtpTestsuite";

pub const LTP_LITE_TESTS: [&str; 7] = ["math", "fsx", "ipc", "mm", "sched", "pty", "fs"];

pub const DEFAULT_DRIVE: &str = "/dev/sdc";

#[derive(Error, Debug)]
pub enum SuiteError {
    #[error("The following tests failed: {names:?}")]
    TestsFailed { names: Vec<String> },

    #[error(transparent)]
    Ltp(#[from] LtpError),

    #[error("Notifier error: {0}")]
    Notifier(#[from] NotifierError),
}

pub type SuiteResult<T> = Result<T, SuiteError>;

/// Test selection for one suite run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteVariables {
    pub tests: Vec<String>,
    pub skip_tests: Vec<String>,
    pub drive: Option<String>,
}

impl Default for SuiteVariables {
    fn default() -> Self {
        Self {
            tests: lite_tests(),
            skip_tests: Vec::new(),
            drive: Some(DEFAULT_DRIVE.to_string()),
        }
    }
}

impl SuiteVariables {
    /// From `ltp_test` / `ltp_skip_test` style comma-separated strings. An
    /// empty test string selects the lite set.
    pub fn from_strings(ltp_test: &str, ltp_skip_test: &str) -> Self {
        let tests = split_list(ltp_test);
        Self {
            tests: if tests.is_empty() { lite_tests() } else { tests },
            skip_tests: split_list(ltp_skip_test),
            ..Self::default()
        }
    }

    pub fn from_config(config: &SuiteConfig) -> Self {
        Self {
            tests: if config.tests.is_empty() {
                lite_tests()
            } else {
                config.tests.clone()
            },
            skip_tests: config.skip_tests.clone(),
            drive: config.drive.clone(),
        }
    }
}

fn lite_tests() -> Vec<String> {
    LTP_LITE_TESTS.iter().map(|t| t.to_string()).collect()
}

/// Fails with the failed names, in log order, when any result failed.
pub fn check_failures(results: &[LtpResult]) -> SuiteResult<()> {
    let names = failed_test_names(results);
    if names.is_empty() {
        Ok(())
    } else {
        Err(SuiteError::TestsFailed { names })
    }
}

pub struct LtpLiteSuite {
    variables: SuiteVariables,
}

impl LtpLiteSuite {
    pub fn new(variables: SuiteVariables) -> Self {
        Self { variables }
    }

    pub fn variables(&self) -> &SuiteVariables {
        &self.variables
    }

    /// Runs the selection, reports every result, then checks for failures.
    pub async fn run(
        &self,
        runner: &LtpRunner,
        notifiers: &mut NotifierHub,
    ) -> SuiteResult<Vec<LtpResult>> {
        info!(
            "Running {} with tests [{}]",
            SUITE_NAME,
            self.variables.tests.join(",")
        );
        let results = runner
            .run_test(
                &self.variables.tests,
                &self.variables.skip_tests,
                self.variables.drive.as_deref(),
            )
            .await?;

        for result in &results {
            notifiers.notify(&TestResultMessage::from_ltp_result(result, SUITE_NAME))?;
        }

        if let Err(error) = check_failures(&results) {
            warn!("{}", error);
            return Err(error);
        }
        Ok(results)
    }
}
