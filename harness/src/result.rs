//! Typed LTP results.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    #[default]
    Queued,
    Passed,
    Failed,
    Skipped,
}

impl TestStatus {
    pub const ALL: [TestStatus; 4] = [
        TestStatus::Queued,
        TestStatus::Passed,
        TestStatus::Failed,
        TestStatus::Skipped,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TestStatus::Queued => "QUEUED",
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Skipped => "SKIPPED",
        }
    }

    /// Whether the status is final.
    pub fn is_completed(&self) -> bool {
        !matches!(self, TestStatus::Queued)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One LTP sub-test outcome from a result log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LtpResult {
    pub version: String,
    pub architecture: String,
    pub name: String,
    pub status: TestStatus,
    pub exit_value: i32,
}

/// Names of failed results, in log order.
pub fn failed_test_names(results: &[LtpResult]) -> Vec<String> {
    results
        .iter()
        .filter(|result| result.status == TestStatus::Failed)
        .map(|result| result.name.clone())
        .collect()
}
