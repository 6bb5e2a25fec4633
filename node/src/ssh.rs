use crate::config::SshConfig;
use crate::executor::{CommandExecutor, NodeError, NodeResult};
use crate::process::run_with_timeout;
use crate::types::{ExecuteRequest, ExecuteResult};
use async_trait::async_trait;
use tracing::debug;

/// Runs commands on a remote node through the system `ssh` client.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    config: SshConfig,
    program: String,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> NodeResult<Self> {
        config
            .validate()
            .map_err(|message| NodeError::InvalidConfig { message })?;

        Ok(Self {
            config,
            program: "ssh".to_string(),
        })
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Full ssh argument vector for one remote command line.
    pub fn ssh_args(&self, remote_command: &str) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.config.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
        ];

        if !self.config.strict_host_key_checking {
            args.push("-o".to_string());
            args.push("StrictHostKeyChecking=accept-new".to_string());
        }

        if let Some(identity) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }

        for option in &self.config.extra_options {
            args.push("-o".to_string());
            args.push(option.clone());
        }

        args.push(self.config.destination());
        args.push("--".to_string());
        args.push(remote_command.to_string());
        args
    }
}

#[async_trait]
impl CommandExecutor for SshExecutor {
    async fn execute(&self, request: &ExecuteRequest) -> NodeResult<ExecuteResult> {
        let line = request.command_line();
        let limit = request
            .timeout
            .unwrap_or_else(|| self.config.default_timeout());
        debug!("ssh {}: {}", self.config.destination(), line);

        let result = run_with_timeout(&self.program, &self.ssh_args(&line), limit, &line).await?;

        if is_connection_failure(&result) {
            return Err(NodeError::CommandFailed {
                command: format!("ssh {}", self.config.destination()),
                exit_code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }

        Ok(result)
    }

    fn executor_name(&self) -> &'static str {
        "ssh"
    }
}

/// ssh exits 255 on its own failures, but a remote command may exit 255 too.
/// Only the former carries ssh's diagnostics on stderr.
fn is_connection_failure(result: &ExecuteResult) -> bool {
    result.exit_code == 255
        && result.stderr.lines().any(|line| {
            let line = line.trim();
            line.starts_with("ssh:")
                || line.contains("Permission denied (")
                || line.starts_with("Host key verification failed")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rejects_invalid_config() {
        let result = SshExecutor::new(SshConfig::new().with_host(""));
        assert!(matches!(result, Err(NodeError::InvalidConfig { .. })));
    }

    #[test]
    fn test_ssh_args() {
        let config = SshConfig::new()
            .with_host("10.1.2.3")
            .with_user("lisa")
            .with_port(2200)
            .with_identity_file("/keys/id_rsa")
            .with_connect_timeout(Duration::from_secs(7));
        let executor = SshExecutor::new(config).unwrap();

        let args = executor.ssh_args("uname -m");
        assert_eq!(&args[..2], &["-p", "2200"]);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=7".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=accept-new".to_string()));
        assert!(args.windows(2).any(|w| w == ["-i", "/keys/id_rsa"]));
        assert_eq!(
            &args[args.len() - 3..],
            &["lisa@10.1.2.3", "--", "uname -m"]
        );
    }

    #[test]
    fn test_strict_host_key_checking_omits_accept_new() {
        let mut config = SshConfig::new().with_host("node1");
        config.strict_host_key_checking = true;
        config.extra_options = vec!["ServerAliveInterval=30".to_string()];
        let executor = SshExecutor::new(config).unwrap();

        let args = executor.ssh_args("true");
        assert!(!args.contains(&"StrictHostKeyChecking=accept-new".to_string()));
        assert!(args.contains(&"ServerAliveInterval=30".to_string()));
    }

    #[tokio::test]
    async fn test_missing_ssh_binary() {
        let executor = SshExecutor::new(SshConfig::new().with_host("node1"))
            .unwrap()
            .with_program("/nonexistent/ssh");
        let result = executor.execute(&ExecuteRequest::new("true")).await;
        assert!(matches!(result, Err(NodeError::SpawnFailed { .. })));
    }

    #[test]
    fn test_connection_failure_needs_ssh_diagnostic() {
        let refused = ExecuteResult::new(
            255,
            "",
            "ssh: connect to host node1 port 22: Connection refused\n",
        );
        assert!(is_connection_failure(&refused));
        let denied = ExecuteResult::new(255, "", "root@node1: Permission denied (publickey).\n");
        assert!(is_connection_failure(&denied));

        assert!(!is_connection_failure(&ExecuteResult::new(255, "", "")));
        assert!(!is_connection_failure(&ExecuteResult::new(
            255,
            "",
            "runltp: test failed\n"
        )));
        assert!(!is_connection_failure(&ExecuteResult::new(1, "", "ssh: oops")));
    }

    #[cfg(unix)]
    fn fake_ssh(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("ssh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_remote_exit_255_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let executor = SshExecutor::new(SshConfig::new().with_host("node1"))
            .unwrap()
            .with_program(fake_ssh(&dir, "exit 255"));

        let result = executor
            .execute(&ExecuteRequest::new("/opt/ltp/runltp -f math"))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 255);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ssh_exit_255_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = SshExecutor::new(SshConfig::new().with_host("node1"))
            .unwrap()
            .with_program(fake_ssh(
                &dir,
                "echo 'ssh: connect to host node1 port 22: Connection refused' >&2; exit 255",
            ));

        let result = executor.execute(&ExecuteRequest::new("true")).await;
        assert!(matches!(
            result,
            Err(NodeError::CommandFailed { exit_code: 255, .. })
        ));
    }
}
