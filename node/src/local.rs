use crate::executor::{CommandExecutor, NodeResult};
use crate::process::run_with_timeout;
use crate::types::{ExecuteRequest, ExecuteResult};
use async_trait::async_trait;
use std::time::Duration;

/// Runs commands on the current machine through `sh -c`.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    shell: String,
    default_timeout: Duration,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
            default_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for LocalExecutor {
    async fn execute(&self, request: &ExecuteRequest) -> NodeResult<ExecuteResult> {
        let line = request.command_line();
        let limit = request.timeout.unwrap_or(self.default_timeout);
        run_with_timeout(&self.shell, &["-c".to_string(), line.clone()], limit, &line).await
    }

    fn executor_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NodeError;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_local_echo() {
        let executor = LocalExecutor::new();
        let result = assert_ok!(executor.execute(&ExecuteRequest::new("echo hello")).await);
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_local_nonzero_exit_is_not_an_error() {
        let executor = LocalExecutor::new();
        let result = assert_ok!(
            executor
                .execute(&ExecuteRequest::new("echo oops >&2; exit 3"))
                .await
        );
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_local_cwd() {
        let executor = LocalExecutor::new();
        let result = assert_ok!(
            executor
                .execute(&ExecuteRequest::new("pwd").with_cwd("/"))
                .await
        );
        assert_eq!(result.stdout.trim(), "/");
    }

    #[tokio::test]
    async fn test_local_timeout() {
        let executor = LocalExecutor::new();
        let request = ExecuteRequest::new("sleep 5").with_timeout(Duration::from_millis(100));
        let error = assert_err!(executor.execute(&request).await);
        assert!(matches!(error, NodeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_shell() {
        let executor = LocalExecutor::new().with_shell("/nonexistent/shell");
        let error = assert_err!(executor.execute(&ExecuteRequest::new("true")).await);
        assert!(matches!(error, NodeError::SpawnFailed { .. }));
    }
}
