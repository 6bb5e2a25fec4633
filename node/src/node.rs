//! Node-level operations layered over a [`CommandExecutor`].
//!
//! A [`Node`] remembers the result of every command it runs without
//! `force_run`. A later unforced request with the same command line returns
//! the remembered result; anything that reads changing state should force.

use crate::executor::{CommandExecutor, NodeError, NodeResult};
use crate::types::{shell_quote, ExecuteRequest, ExecuteResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const OS_RELEASE_PATH: &str = "/etc/os-release";

pub struct Node {
    executor: Arc<dyn CommandExecutor>,
    cache: Mutex<HashMap<String, ExecuteResult>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("executor", &self.executor.executor_name())
            .finish()
    }
}

impl Node {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn executor_name(&self) -> &'static str {
        self.executor.executor_name()
    }

    /// Number of results held in the cache.
    pub fn cached_results(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Run a request, consulting the result cache unless `force_run` is set.
    pub async fn execute(&self, request: ExecuteRequest) -> NodeResult<ExecuteResult> {
        let key = request.command_line();

        if !request.force_run {
            let cached = self
                .cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .get(&key)
                .cloned();
            if let Some(result) = cached {
                debug!("Using cached result for: {}", key);
                return Ok(result);
            }
        }

        let result = self.executor.execute(&request).await?;
        // Forced runs read changing state; keeping them would only grow the map.
        if !request.force_run {
            self.cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(key, result.clone());
        }
        Ok(result)
    }

    /// Like [`Node::execute`] but a non-zero exit becomes an error.
    pub async fn execute_checked(&self, request: ExecuteRequest) -> NodeResult<ExecuteResult> {
        let command = request.command.clone();
        let result = self.execute(request).await?;
        if !result.success() {
            return Err(NodeError::CommandFailed {
                command,
                exit_code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result)
    }

    pub async fn exists(&self, path: &str, sudo: bool) -> NodeResult<bool> {
        let request = ExecuteRequest::new(format!("test -e {}", shell_quote(path)))
            .with_sudo(sudo)
            .with_force_run(true);
        let result = self.execute(request).await?;
        match result.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            code => Err(NodeError::CommandFailed {
                command: format!("test -e {}", path),
                exit_code: code,
                stderr: result.stderr.trim().to_string(),
            }),
        }
    }

    pub async fn read_file(&self, path: &str, sudo: bool, force_run: bool) -> NodeResult<String> {
        let request = ExecuteRequest::new(format!("cat {}", shell_quote(path)))
            .with_sudo(sudo)
            .with_force_run(force_run);
        Ok(self.execute_checked(request).await?.stdout)
    }

    /// Raw `/etc/os-release` content.
    pub async fn os_release(&self) -> NodeResult<String> {
        self.read_file(OS_RELEASE_PATH, false, false).await
    }

    /// Write `content` verbatim, without a trailing newline.
    pub async fn write_file(&self, path: &str, content: &str, sudo: bool) -> NodeResult<()> {
        let request = ExecuteRequest::new(format!(
            "printf '%s' {} > {}",
            shell_quote(content),
            shell_quote(path)
        ))
        .with_sudo(sudo)
        .with_force_run(true);
        self.execute_checked(request).await?;
        Ok(())
    }

    /// Remove a file; a missing file is not an error.
    pub async fn remove_file(&self, path: &str, sudo: bool) -> NodeResult<()> {
        let request = ExecuteRequest::new(format!("rm -f {}", shell_quote(path)))
            .with_sudo(sudo)
            .with_force_run(true);
        self.execute_checked(request).await?;
        Ok(())
    }

    pub async fn remove_dir(&self, path: &str, sudo: bool) -> NodeResult<()> {
        let request = ExecuteRequest::new(format!("rm -rf {}", shell_quote(path)))
            .with_sudo(sudo)
            .with_force_run(true);
        self.execute_checked(request).await?;
        Ok(())
    }

    pub async fn create_dir(&self, path: &str, sudo: bool) -> NodeResult<()> {
        let request = ExecuteRequest::new(format!("mkdir -p {}", shell_quote(path)))
            .with_sudo(sudo)
            .with_force_run(true);
        self.execute_checked(request).await?;
        Ok(())
    }

    pub async fn chmod_recursive(&self, path: &str, mode: &str, sudo: bool) -> NodeResult<()> {
        let request = ExecuteRequest::new(format!(
            "chmod -R {} {}",
            shell_quote(mode),
            shell_quote(path)
        ))
        .with_sudo(sudo)
        .with_force_run(true);
        self.execute_checked(request).await?;
        Ok(())
    }

    pub async fn nproc(&self) -> NodeResult<usize> {
        let result = self.execute_checked(ExecuteRequest::new("nproc")).await?;
        parse_nproc(&result.stdout)
    }

    /// Total swap in MiB as reported by `free -m`.
    pub async fn swap_size_mb(&self) -> NodeResult<u64> {
        let request = ExecuteRequest::new("free -m").with_force_run(true);
        let result = self.execute_checked(request).await?;
        parse_swap_total(&result.stdout)
    }

    pub async fn sysctl_write(&self, key: &str, value: &str) -> NodeResult<()> {
        info!("Setting sysctl {}={}", key, value);
        let request = ExecuteRequest::new(format!("sysctl -w {}", shell_quote(&format!("{key}={value}"))))
            .with_sudo(true)
            .with_force_run(true);
        self.execute_checked(request).await?;
        Ok(())
    }

    pub async fn sysctl_reload(&self) -> NodeResult<()> {
        let request = ExecuteRequest::new("sysctl -p")
            .with_sudo(true)
            .with_force_run(true);
        self.execute_checked(request).await?;
        Ok(())
    }

    /// First real mount point with at least `min_free_gb` GiB available.
    pub async fn find_partition_with_free_space(&self, min_free_gb: u64) -> NodeResult<String> {
        let request = ExecuteRequest::new("df -P -k").with_force_run(true);
        let result = self.execute_checked(request).await?;
        let mounts = parse_df(&result.stdout)?;

        let required_kb = min_free_gb * 1024 * 1024;
        mounts
            .into_iter()
            .find(|mount| mount.available_kb >= required_kb && !is_pseudo_mount(mount))
            .map(|mount| mount.mount_point)
            .ok_or_else(|| NodeError::UnexpectedOutput {
                command: "df -P -k".to_string(),
                reason: format!("no partition with {}GB free space", min_free_gb),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountUsage {
    pub filesystem: String,
    pub available_kb: u64,
    pub mount_point: String,
}

const PSEUDO_FILESYSTEMS: &[&str] = &["tmpfs", "devtmpfs", "udev", "overlay", "none", "shm"];
const SKIPPED_MOUNT_PREFIXES: &[&str] = &["/boot", "/dev", "/proc", "/run", "/sys", "/snap"];

fn is_pseudo_mount(mount: &MountUsage) -> bool {
    PSEUDO_FILESYSTEMS.contains(&mount.filesystem.as_str())
        || SKIPPED_MOUNT_PREFIXES
            .iter()
            .any(|prefix| mount.mount_point == *prefix || mount.mount_point.starts_with(&format!("{prefix}/")))
}

pub fn parse_nproc(output: &str) -> NodeResult<usize> {
    output
        .trim()
        .parse::<usize>()
        .map_err(|e| NodeError::UnexpectedOutput {
            command: "nproc".to_string(),
            reason: e.to_string(),
        })
}

// Example output:
//               total        used        free
// Mem:           7951         512        6923
// Swap:             0           0           0
pub fn parse_swap_total(output: &str) -> NodeResult<u64> {
    for line in output.lines() {
        if let Some(rest) = line.trim_start().strip_prefix("Swap:") {
            let total = rest.split_whitespace().next().unwrap_or_default();
            return total.parse().map_err(|_| NodeError::UnexpectedOutput {
                command: "free -m".to_string(),
                reason: format!("invalid swap total '{}'", total),
            });
        }
    }

    Err(NodeError::UnexpectedOutput {
        command: "free -m".to_string(),
        reason: "Failed to get swap size".to_string(),
    })
}

/// Parse POSIX `df -P -k` output, skipping the header.
pub fn parse_df(output: &str) -> NodeResult<Vec<MountUsage>> {
    let mut mounts = Vec::new();
    for line in output.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            continue;
        }
        let available_kb = fields[3].parse().map_err(|_| NodeError::UnexpectedOutput {
            command: "df -P -k".to_string(),
            reason: format!("invalid available size in line '{}'", line),
        })?;
        mounts.push(MountUsage {
            filesystem: fields[0].to_string(),
            available_kb,
            mount_point: fields[5..].join(" "),
        });
    }
    Ok(mounts)
}
