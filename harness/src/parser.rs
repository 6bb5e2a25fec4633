//! LTP result log parsing.
//!
//! A `runltp -l` result log looks like:
//!
//! ```text
//! Test Start Time: Wed Jun  8 23:43:08 2022
//! -----------------------------------------
//! Testcase                                           Result     Exit Value
//! --------                                           ------     ----------
//! abs01                                              PASS       0
//! mmap01                                             FAIL       1
//! ...
//! Machine Architecture: x86_64
//! ```

use crate::result::{LtpResult, TestStatus};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

// Machine Architecture: x86_64
static ARCHITECTURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*Machine Architecture:[ \t]*(\S[^\r\n]*?)[ \t]*\r?$")
        .expect("valid regex")
});

// abs01  PASS  0
// The status is any upper-case word so unknown codes are reported, not dropped.
static TESTCASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(\S+)[ \t]+([A-Z]+)[ \t]+(-?\d+)[ \t]*\r?$").expect("valid regex")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Result log has no 'Machine Architecture' line")]
    MissingArchitecture,

    #[error("Result log has {count} 'Machine Architecture' lines, expected one")]
    DuplicateArchitecture { count: usize },

    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    #[error("Invalid exit value '{value}' for test {name}")]
    InvalidExitValue { name: String, value: String },
}

pub type ParseResult<T> = Result<T, ParseError>;

pub fn parse_status(code: &str) -> ParseResult<TestStatus> {
    match code {
        "PASS" => Ok(TestStatus::Passed),
        "FAIL" => Ok(TestStatus::Failed),
        "CONF" => Ok(TestStatus::Skipped),
        other => Err(ParseError::UnknownStatus(other.to_string())),
    }
}

/// Parses result logs produced by one pinned LTP release.
#[derive(Debug, Clone)]
pub struct ResultParser {
    version: String,
}

impl ResultParser {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn parse_architecture(&self, log: &str) -> ParseResult<String> {
        let matches: Vec<&str> = ARCHITECTURE_RE
            .captures_iter(log)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .collect();

        match matches.as_slice() {
            [] => Err(ParseError::MissingArchitecture),
            [architecture] => Ok(architecture.to_string()),
            many => Err(ParseError::DuplicateArchitecture { count: many.len() }),
        }
    }

    /// Records in log order, all sharing the run's architecture.
    pub fn parse(&self, log: &str) -> ParseResult<Vec<LtpResult>> {
        let architecture = self.parse_architecture(log)?;

        TESTCASE_RE
            .captures_iter(log)
            .map(|caps| -> ParseResult<LtpResult> {
                let name = caps[1].trim().to_string();
                let status = parse_status(caps[2].trim())?;
                let raw_exit = caps[3].trim();
                let exit_value = raw_exit
                    .parse::<i32>()
                    .map_err(|_| ParseError::InvalidExitValue {
                        name: name.clone(),
                        value: raw_exit.to_string(),
                    })?;

                Ok(LtpResult {
                    version: self.version.clone(),
                    architecture: architecture.clone(),
                    name,
                    status,
                    exit_value,
                })
            })
            .collect()
    }
}
