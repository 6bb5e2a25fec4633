use crate::types::{ExecuteRequest, ExecuteResult};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Command timed out after {}s: {command}", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("Command '{command}' exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Unexpected output from '{command}': {reason}")]
    UnexpectedOutput { command: String, reason: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

pub type NodeResult<T> = Result<T, NodeError>;

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, request: &ExecuteRequest) -> NodeResult<ExecuteResult>;

    fn executor_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoExecutor;

    #[async_trait]
    impl CommandExecutor for EchoExecutor {
        async fn execute(&self, request: &ExecuteRequest) -> NodeResult<ExecuteResult> {
            Ok(ExecuteResult::new(0, request.command_line(), ""))
        }

        fn executor_name(&self) -> &'static str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_executor_trait_object() {
        let executor: Box<dyn CommandExecutor> = Box::new(EchoExecutor);
        let result = executor
            .execute(&ExecuteRequest::new("uname -m"))
            .await
            .unwrap();
        assert_eq!(result.stdout, "uname -m");
        assert_eq!(executor.executor_name(), "echo");
    }

    #[test]
    fn test_error_display() {
        let error = NodeError::Timeout {
            command: "runltp".to_string(),
            timeout: Duration::from_secs(12000),
        };
        assert_eq!(error.to_string(), "Command timed out after 12000s: runltp");

        let error = NodeError::CommandFailed {
            command: "cat /opt/ltp/ltp-results.log".to_string(),
            exit_code: 1,
            stderr: "No such file or directory".to_string(),
        };
        assert!(error.to_string().contains("exited with code 1"));
        assert!(error.to_string().contains("No such file"));
    }
}
