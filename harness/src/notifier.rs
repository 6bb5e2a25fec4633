//! Result reporting.
//!
//! Suites turn each [`LtpResult`] into a [`TestResultMessage`] and send it to
//! every registered [`Notifier`], one message at a time in result order.

use crate::result::{LtpResult, TestStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Result file already exists: {0}")]
    FileExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type NotifierResult<T> = Result<T, NotifierError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResultMessage {
    pub id: Uuid,
    pub name: String,
    pub suite_name: String,
    pub status: TestStatus,
    pub message: String,
    pub information: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl TestResultMessage {
    pub fn new(name: impl Into<String>, suite_name: impl Into<String>, status: TestStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            suite_name: suite_name.into(),
            status,
            message: String::new(),
            information: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Community result message carrying architecture, version and exit value.
    pub fn from_ltp_result(result: &LtpResult, suite_name: &str) -> Self {
        let mut message = Self::new(result.name.clone(), suite_name, result.status);
        message
            .information
            .insert("architecture".to_string(), result.architecture.clone());
        message
            .information
            .insert("version".to_string(), result.version.clone());
        message
            .information
            .insert("exit_value".to_string(), result.exit_value.to_string());
        message
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.suite_name, self.name)
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }
}

pub trait Notifier: Send {
    fn name(&self) -> &str;

    fn notify(&mut self, message: &TestResultMessage) -> NotifierResult<()>;

    fn finalize(&mut self) -> NotifierResult<()> {
        Ok(())
    }
}

/// Fans messages out to every registered notifier.
#[derive(Default)]
pub struct NotifierHub {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn list_notifiers(&self) -> Vec<&str> {
        self.notifiers.iter().map(|n| n.name()).collect()
    }

    pub fn notify(&mut self, message: &TestResultMessage) -> NotifierResult<()> {
        for notifier in &mut self.notifiers {
            notifier.notify(message)?;
        }
        Ok(())
    }

    pub fn finalize(&mut self) -> NotifierResult<()> {
        for notifier in &mut self.notifiers {
            notifier.finalize()?;
        }
        Ok(())
    }
}

/// Emits one tracing event per result.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&mut self, message: &TestResultMessage) -> NotifierResult<()> {
        info!(
            test = %message.full_name(),
            status = %message.status,
            architecture = message.information.get("architecture").map(String::as_str).unwrap_or(""),
            exit_value = message.information.get("exit_value").map(String::as_str).unwrap_or(""),
            "test result"
        );
        Ok(())
    }
}

/// Keeps every message in memory, for callers that inspect results afterwards.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    pub messages: Vec<TestResultMessage>,
}

impl Notifier for CollectingNotifier {
    fn name(&self) -> &str {
        "collect"
    }

    fn notify(&mut self, message: &TestResultMessage) -> NotifierResult<()> {
        self.messages.push(message.clone());
        Ok(())
    }
}

/// Prints the summary table to stdout when finalized.
#[derive(Debug, Default)]
pub struct ConsoleNotifier {
    received: Vec<TestResultMessage>,
}

impl Notifier for ConsoleNotifier {
    fn name(&self) -> &str {
        "console"
    }

    fn notify(&mut self, message: &TestResultMessage) -> NotifierResult<()> {
        if message.is_completed() {
            self.received.push(message.clone());
        }
        Ok(())
    }

    fn finalize(&mut self) -> NotifierResult<()> {
        print_results(&self.received, |line| println!("{}", line));
        Ok(())
    }
}

/// Writes a plain-text summary of completed results when finalized. The full
/// log is complete but too long to skim; this is the short version.
#[derive(Debug)]
pub struct TextResultNotifier {
    path: PathBuf,
    received: Vec<TestResultMessage>,
}

impl TextResultNotifier {
    pub fn new(path: impl Into<PathBuf>) -> NotifierResult<Self> {
        let path = path.into();
        if path.exists() {
            return Err(NotifierError::FileExists(path));
        }
        Ok(Self {
            path,
            received: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Notifier for TextResultNotifier {
    fn name(&self) -> &str {
        "text_result"
    }

    fn notify(&mut self, message: &TestResultMessage) -> NotifierResult<()> {
        if message.is_completed() {
            self.received.push(message.clone());
        }
        Ok(())
    }

    fn finalize(&mut self) -> NotifierResult<()> {
        let mut content = String::new();
        print_results(&self.received, |line| {
            content.push_str(line);
            content.push('\n');
        });
        std::fs::write(&self.path, content)?;
        info!("Wrote result summary to {}", self.path.display());
        Ok(())
    }
}

/// Summary table followed by per-status counts.
pub fn print_results<F>(results: &[TestResultMessage], mut output: F)
where
    F: FnMut(&str),
{
    output("________________________________________");
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for result in results {
        output(&format!(
            "{:>50}: {:<8} {}",
            result.full_name(),
            result.status.name(),
            result.message
        ));
        *counts.entry(result.status.name()).or_default() += 1;
    }

    output("test result summary");
    output(&format!("    TOTAL    : {}", results.len()));
    for status in TestStatus::ALL {
        let count = counts.get(status.name()).copied().unwrap_or(0);
        output(&format!("    {:<9}: {}", status.name(), count));
    }
}
