use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub default_timeout_secs: u64,
    pub strict_host_key_checking: bool,
    pub extra_options: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 22,
            user: "root".to_string(),
            identity_file: None,
            connect_timeout_secs: 30,
            default_timeout_secs: 600,
            strict_host_key_checking: false,
            extra_options: Vec::new(),
        }
    }
}

impl SshConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_secs = timeout.as_secs();
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    /// `user@host` destination understood by the ssh client.
    pub fn destination(&self) -> String {
        if self.user.is_empty() {
            self.host.clone()
        } else {
            format!("{}@{}", self.user, self.host)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Host cannot be empty".to_string());
        }

        if self.host.contains(char::is_whitespace) {
            return Err(format!("Host '{}' must not contain whitespace", self.host));
        }

        if self.port == 0 {
            return Err("Port must be greater than 0".to_string());
        }

        if self.connect_timeout_secs == 0 {
            return Err("Connect timeout must be greater than 0".to_string());
        }

        if self.default_timeout_secs == 0 {
            return Err("Default command timeout must be greater than 0".to_string());
        }

        if let Some(identity) = &self.identity_file {
            if identity.as_os_str().is_empty() {
                return Err("Identity file path cannot be empty".to_string());
            }
        }

        Ok(())
    }
}
