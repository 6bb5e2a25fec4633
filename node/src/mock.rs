//! Scripted executor for tests.
//!
//! Rules are matched in registration order against the request's command
//! text (substring match). Unmatched commands succeed with empty output.
//! Every request is recorded so tests can assert on what was sent.

use crate::executor::{CommandExecutor, NodeError, NodeResult};
use crate::types::{ExecuteRequest, ExecuteResult};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone)]
pub enum MockResponse {
    Output(ExecuteResult),
    Timeout,
    SpawnFailure(String),
}

#[derive(Debug, Clone)]
struct MockRule {
    pattern: String,
    response: MockResponse,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
pub struct MockExecutor {
    rules: Mutex<Vec<MockRule>>,
    invocations: Mutex<Vec<ExecuteRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command containing `pattern` with `response`.
    pub fn respond(self, pattern: impl Into<String>, response: MockResponse) -> Self {
        self.push_rule(pattern.into(), response, None);
        self
    }

    /// Answer only the next matching command; later ones fall through.
    pub fn respond_once(self, pattern: impl Into<String>, response: MockResponse) -> Self {
        self.push_rule(pattern.into(), response, Some(1));
        self
    }

    pub fn on_stdout(self, pattern: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.respond(pattern, MockResponse::Output(ExecuteResult::new(0, stdout, "")))
    }

    pub fn on_exit(self, pattern: impl Into<String>, exit_code: i32) -> Self {
        self.respond(
            pattern,
            MockResponse::Output(ExecuteResult::new(exit_code, "", "")),
        )
    }

    fn push_rule(&self, pattern: String, response: MockResponse, remaining: Option<usize>) {
        lock(&self.rules).push(MockRule {
            pattern,
            response,
            remaining,
        });
    }

    pub fn invocations(&self) -> Vec<ExecuteRequest> {
        lock(&self.invocations).clone()
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.invocations)
            .iter()
            .map(|request| request.command.clone())
            .collect()
    }

    /// Recorded requests whose command contains `pattern`.
    pub fn invocations_matching(&self, pattern: &str) -> Vec<ExecuteRequest> {
        lock(&self.invocations)
            .iter()
            .filter(|request| request.command.contains(pattern))
            .cloned()
            .collect()
    }

    pub fn clear_invocations(&self) {
        lock(&self.invocations).clear();
    }

    fn next_response(&self, command: &str) -> MockResponse {
        let mut rules = lock(&self.rules);
        for rule in rules.iter_mut() {
            if rule.remaining == Some(0) || !command.contains(&rule.pattern) {
                continue;
            }
            if let Some(remaining) = rule.remaining.as_mut() {
                *remaining -= 1;
            }
            return rule.response.clone();
        }
        MockResponse::Output(ExecuteResult::new(0, "", ""))
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute(&self, request: &ExecuteRequest) -> NodeResult<ExecuteResult> {
        debug!("mock execute: {}", request.command_line());
        lock(&self.invocations).push(request.clone());

        match self.next_response(&request.command) {
            MockResponse::Output(result) => Ok(result),
            MockResponse::Timeout => Err(NodeError::Timeout {
                command: request.command_line(),
                timeout: request.timeout.unwrap_or_default(),
            }),
            MockResponse::SpawnFailure(reason) => Err(NodeError::SpawnFailed {
                program: "mock".to_string(),
                reason,
            }),
        }
    }

    fn executor_name(&self) -> &'static str {
        "mock"
    }
}
