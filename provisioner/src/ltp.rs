//! LTP install pipeline.
//!
//! Installation runs these steps in order, each guarded so a re-run on a
//! partially prepared node does not repeat work that is already in place:
//! - distribution packages
//! - real-time scheduler budget for the cpu cgroup
//! - minimum swap space
//! - dirty page ratios
//! - clone, configure, build and install into the install prefix

use crate::os::{install_packages, refresh_package_index, OsInfo, BUILD_TOOLS, COMMON_PACKAGES};
use crate::{ProvisionError, ProvisionResult};
use node::{shell_quote, ExecuteRequest, Node};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const CGROUP_CPU_ROOT: &str = "/sys/fs/cgroup/cpu";
const CGROUP_USER_SLICE: &str = "/sys/fs/cgroup/cpu/user.slice";
const RT_PERIOD_US: &str = "1000000";
const RT_RUNTIME_US: &str = "950000";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    pub git_url: String,
    /// Pinned LTP release tag; also the `version` of every parsed result.
    pub git_tag: String,
    pub install_prefix: String,
    pub dir_name: String,
    pub required_disk_gb: u64,
    pub min_swap_mb: u64,
    pub swap_file: String,
    pub swap_file_size_mb: u64,
    pub build_timeout_secs: u64,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            git_url: "https://github.com/linux-test-project/ltp.git".to_string(),
            git_tag: "20190930".to_string(),
            install_prefix: "/opt/ltp".to_string(),
            dir_name: "ltp".to_string(),
            required_disk_gb: 2,
            min_swap_mb: 4,
            swap_file: "/tmp/swap".to_string(),
            swap_file_size_mb: 1024,
            build_timeout_secs: 3600,
        }
    }
}

impl InstallConfig {
    pub fn binary_path(&self) -> String {
        format!("{}/runltp", self.install_prefix.trim_end_matches('/'))
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.git_url.is_empty() {
            return Err("Git URL cannot be empty".to_string());
        }

        if self.git_tag.is_empty() {
            return Err("Git tag cannot be empty".to_string());
        }

        if !self.install_prefix.starts_with('/') {
            return Err(format!(
                "Install prefix '{}' must be an absolute path",
                self.install_prefix
            ));
        }

        if self.dir_name.is_empty() || self.dir_name.contains('/') {
            return Err(format!("Invalid build directory name '{}'", self.dir_name));
        }

        if self.swap_file_size_mb < self.min_swap_mb {
            return Err("Swap file size must cover the minimum swap size".to_string());
        }

        if self.build_timeout_secs == 0 {
            return Err("Build timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Installs LTP on a node
#[derive(Debug, Clone, Default)]
pub struct LtpInstaller {
    config: InstallConfig,
}

impl LtpInstaller {
    pub fn new(config: InstallConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InstallConfig {
        &self.config
    }

    pub async fn is_installed(&self, node: &Node) -> ProvisionResult<bool> {
        Ok(node.exists(&self.config.binary_path(), true).await?)
    }

    pub async fn install(&self, node: &Node) -> ProvisionResult<()> {
        info!("Installing LTP {} on {} node", self.config.git_tag, node.executor_name());

        let os = OsInfo::detect(node).await?;
        self.install_dependencies(node, &os).await?;
        self.tune_rt_scheduler(node).await?;
        self.ensure_swap(node).await?;
        self.tune_dirty_ratio(node).await?;
        self.build(node).await?;

        if !self.is_installed(node).await? {
            return Err(ProvisionError::InstallationFailed {
                path: self.config.binary_path(),
            });
        }

        info!("LTP installed at {}", self.config.install_prefix);
        Ok(())
    }

    pub async fn install_dependencies(&self, node: &Node, os: &OsInfo) -> ProvisionResult<()> {
        refresh_package_index(node, os.family).await?;
        install_packages(node, os.family, BUILD_TOOLS).await?;
        install_packages(node, os.family, COMMON_PACKAGES).await?;
        install_packages(node, os.family, &os.ltp_packages()).await
    }

    /// Leave 5% of each second to non-RT tasks when the cgroup RT budget is
    /// zero, otherwise every cgroup test that sets an RT policy fails.
    pub async fn tune_rt_scheduler(&self, node: &Node) -> ProvisionResult<()> {
        let runtime_path = format!("{}/cpu.rt_runtime_us", CGROUP_USER_SLICE);
        if !node.exists(&runtime_path, false).await? {
            debug!("{} not present, skipping RT tuning", runtime_path);
            return Ok(());
        }

        let raw = node.read_file(&runtime_path, true, true).await?;
        let runtime_us: i64 = raw.trim().parse().map_err(|_| ProvisionError::InvalidTunable {
            path: runtime_path.clone(),
            value: raw.trim().to_string(),
        })?;
        if runtime_us != 0 {
            debug!("RT runtime already {}us", runtime_us);
            return Ok(());
        }

        for dir in [CGROUP_CPU_ROOT, CGROUP_USER_SLICE] {
            node.write_file(&format!("{}/cpu.rt_period_us", dir), RT_PERIOD_US, true)
                .await?;
            node.write_file(&format!("{}/cpu.rt_runtime_us", dir), RT_RUNTIME_US, true)
                .await?;
        }
        Ok(())
    }

    /// Some mm tests need a few MB of swap.
    pub async fn ensure_swap(&self, node: &Node) -> ProvisionResult<()> {
        let swap_mb = node.swap_size_mb().await?;
        if swap_mb >= self.config.min_swap_mb {
            debug!("Swap already {}MB", swap_mb);
            return Ok(());
        }

        info!(
            "Swap is {}MB, creating {}MB swap file at {}",
            swap_mb, self.config.swap_file_size_mb, self.config.swap_file
        );
        let swap_file = shell_quote(&self.config.swap_file);
        let commands = [
            format!(
                "dd if=/dev/zero of={} bs=1M count={}",
                swap_file, self.config.swap_file_size_mb
            ),
            format!("chmod 600 {}", swap_file),
            format!("mkswap {}", swap_file),
            format!("swapon {}", swap_file),
        ];
        for command in commands {
            let request = ExecuteRequest::new(command)
                .with_sudo(true)
                .with_force_run(true);
            node.execute_checked(request).await?;
        }
        Ok(())
    }

    /// Avoids "blocked for more than 120 seconds" hangs during the fs tests.
    pub async fn tune_dirty_ratio(&self, node: &Node) -> ProvisionResult<()> {
        node.sysctl_write("vm.dirty_ratio", "10").await?;
        node.sysctl_write("vm.dirty_background_ratio", "5").await?;
        node.sysctl_reload().await?;
        Ok(())
    }

    pub async fn build(&self, node: &Node) -> ProvisionResult<()> {
        let build_dir = node
            .find_partition_with_free_space(self.config.required_disk_gb)
            .await?;
        let src_dir = join_path(&build_dir, &self.config.dir_name);
        info!("Building LTP in {}", src_dir);

        if node.exists(&src_dir, true).await? {
            node.remove_dir(&src_dir, true).await?;
        }
        node.create_dir(&src_dir, true).await?;
        node.chmod_recursive(&src_dir, "a+rwX", true).await?;

        let quoted_src = shell_quote(&src_dir);
        let clone = ExecuteRequest::new(format!(
            "git clone {} {}",
            shell_quote(&self.config.git_url),
            quoted_src
        ))
        .with_force_run(true)
        .with_timeout(self.config.build_timeout());
        node.execute_checked(clone).await?;

        let checkout = ExecuteRequest::new(format!(
            "git checkout {}",
            shell_quote(&format!("tags/{}", self.config.git_tag))
        ))
        .with_cwd(src_dir.clone())
        .with_force_run(true);
        node.execute_checked(checkout).await?;

        // Installed under the fixed prefix because some tests (block_dev)
        // look for their helpers there.
        let nprocs = node.nproc().await?;
        let steps = [
            "autoreconf -f".to_string(),
            "make autotools".to_string(),
            format!(
                "./configure --prefix={}",
                shell_quote(&self.config.install_prefix)
            ),
            format!("make -j {} all", nprocs),
            format!("make -j {} install SKIP_IDCHECK=1", nprocs),
        ];
        for step in steps {
            let request = ExecuteRequest::new(step)
                .with_cwd(src_dir.clone())
                .with_sudo(true)
                .with_force_run(true)
                .with_timeout(self.config.build_timeout());
            node.execute_checked(request).await?;
        }
        Ok(())
    }
}

fn join_path(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use node::{ExecuteResult, MockExecutor, MockResponse};
    use crate::os::OsRelease;
    use std::sync::Arc;

    const DF_OUTPUT: &str = "\
Filesystem     1024-blocks     Used Available Capacity Mounted on
/dev/root         30297152 10000000  20297152      33% /
";

    fn node_with(mock: MockExecutor) -> (Node, Arc<MockExecutor>) {
        let mock = Arc::new(mock);
        (Node::new(mock.clone()), mock)
    }

    fn position(commands: &[String], needle: &str) -> usize {
        commands
            .iter()
            .position(|c| c.contains(needle))
            .unwrap_or_else(|| panic!("command containing '{}' not issued", needle))
    }

    #[test]
    fn test_default_config() {
        let config = InstallConfig::default();
        assert_eq!(config.git_tag, "20190930");
        assert_eq!(config.binary_path(), "/opt/ltp/runltp");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = InstallConfig::default();
        config.install_prefix = "opt/ltp".to_string();
        assert!(config.validate().is_err());

        config.install_prefix = "/opt/ltp/".to_string();
        assert_eq!(config.binary_path(), "/opt/ltp/runltp");
        assert!(config.validate().is_ok());

        config.dir_name = "a/b".to_string();
        assert!(config.validate().is_err());

        config.dir_name = "ltp".to_string();
        config.swap_file_size_mb = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "ltp"), "/ltp");
        assert_eq!(join_path("/mnt", "ltp"), "/mnt/ltp");
    }

    #[tokio::test]
    async fn test_rt_tuning_skipped_when_budget_set() {
        let (node, mock) = node_with(
            MockExecutor::new().on_stdout("cat /sys/fs/cgroup/cpu/user.slice/cpu.rt_runtime_us", "950000\n"),
        );
        LtpInstaller::default().tune_rt_scheduler(&node).await.unwrap();
        assert!(mock.invocations_matching("printf").is_empty());
    }

    #[tokio::test]
    async fn test_rt_tuning_writes_budget_when_zero() {
        let (node, mock) = node_with(
            MockExecutor::new().on_stdout("cat /sys/fs/cgroup/cpu/user.slice/cpu.rt_runtime_us", "0\n"),
        );
        LtpInstaller::default().tune_rt_scheduler(&node).await.unwrap();

        let writes = mock.invocations_matching("printf");
        assert_eq!(writes.len(), 4);
        assert_eq!(
            writes[0].command,
            "printf '%s' 1000000 > /sys/fs/cgroup/cpu/cpu.rt_period_us"
        );
        assert_eq!(
            writes[3].command,
            "printf '%s' 950000 > /sys/fs/cgroup/cpu/user.slice/cpu.rt_runtime_us"
        );
    }

    #[tokio::test]
    async fn test_rt_tuning_skipped_without_cgroup_v1() {
        let (node, mock) = node_with(MockExecutor::new().on_exit("test -e", 1));
        LtpInstaller::default().tune_rt_scheduler(&node).await.unwrap();
        assert!(mock.invocations_matching("cat").is_empty());
    }

    #[tokio::test]
    async fn test_rt_tuning_rejects_garbage() {
        let (node, _mock) = node_with(MockExecutor::new().on_stdout("cat ", "max\n"));
        let error = LtpInstaller::default()
            .tune_rt_scheduler(&node)
            .await
            .unwrap_err();
        assert!(matches!(error, ProvisionError::InvalidTunable { .. }));
    }

    #[tokio::test]
    async fn test_swap_created_only_when_insufficient() {
        let (node, mock) = node_with(MockExecutor::new().on_stdout("free -m", "Swap: 2048 0 2048\n"));
        LtpInstaller::default().ensure_swap(&node).await.unwrap();
        assert!(mock.invocations_matching("mkswap").is_empty());

        let (node, mock) = node_with(MockExecutor::new().on_stdout("free -m", "Swap: 0 0 0\n"));
        LtpInstaller::default().ensure_swap(&node).await.unwrap();
        let commands = mock.commands();
        assert!(position(&commands, "dd if=/dev/zero of=/tmp/swap bs=1M count=1024") < position(&commands, "mkswap /tmp/swap"));
        assert!(position(&commands, "mkswap /tmp/swap") < position(&commands, "swapon /tmp/swap"));
    }

    #[tokio::test]
    async fn test_build_sequence() {
        let (node, mock) = node_with(
            MockExecutor::new()
                .on_stdout("df -P -k", DF_OUTPUT)
                .on_stdout("nproc", "4\n"),
        );
        LtpInstaller::default().build(&node).await.unwrap();

        let commands = mock.commands();
        assert!(position(&commands, "rm -rf /ltp") < position(&commands, "mkdir -p /ltp"));
        assert!(position(&commands, "chmod -R a+rwX /ltp") < position(&commands, "git clone"));
        assert!(position(&commands, "git clone") < position(&commands, "git checkout tags/20190930"));
        assert!(position(&commands, "./configure --prefix=/opt/ltp") < position(&commands, "make -j 4 all"));
        assert!(position(&commands, "make -j 4 all") < position(&commands, "make -j 4 install SKIP_IDCHECK=1"));

        let configure = &mock.invocations_matching("./configure")[0];
        assert_eq!(configure.cwd.as_deref(), Some("/ltp"));
        assert!(configure.sudo);
    }

    #[tokio::test]
    async fn test_install_unsupported_os_stops_early() {
        let (node, mock) = node_with(
            MockExecutor::new().on_stdout("cat /etc/os-release", "ID=haiku\nPRETTY_NAME=\"Haiku\"\n"),
        );
        let error = LtpInstaller::default().install(&node).await.unwrap_err();
        assert!(matches!(error, ProvisionError::UnsupportedEnvironment { .. }));
        assert_eq!(mock.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_install_fails_when_binary_missing() {
        let (node, _mock) = node_with(
            MockExecutor::new()
                .on_stdout("cat /etc/os-release", "ID=mariner\nVERSION_ID=\"2.0\"\n")
                .on_exit("test -e /sys/fs/cgroup", 1)
                .on_exit("test -e /opt/ltp/runltp", 1)
                .on_stdout("free -m", "Swap: 4096 0 4096\n")
                .on_stdout("df -P -k", DF_OUTPUT)
                .on_stdout("nproc", "2\n"),
        );
        let error = LtpInstaller::default().install(&node).await.unwrap_err();
        assert!(matches!(error, ProvisionError::InstallationFailed { ref path } if path == "/opt/ltp/runltp"));
    }

    #[tokio::test]
    async fn test_install_success() {
        let (node, mock) = node_with(
            MockExecutor::new()
                .on_stdout("cat /etc/os-release", "ID=ubuntu\nID_LIKE=debian\nVERSION_ID=\"20.04\"\n")
                .on_exit("test -e /sys/fs/cgroup", 1)
                .on_stdout("free -m", "Swap: 4096 0 4096\n")
                .on_stdout("df -P -k", DF_OUTPUT)
                .on_stdout("nproc", "2\n")
                .respond(
                    "git clone",
                    MockResponse::Output(ExecuteResult::new(0, "", "Cloning into '/ltp'...")),
                ),
        );
        LtpInstaller::default().install(&node).await.unwrap();

        let commands = mock.commands();
        assert!(position(&commands, "apt-get update") < position(&commands, "apt-get install -y -q m4 bison"));
        assert!(position(&commands, "libnuma-dev") < position(&commands, "sysctl -w vm.dirty_ratio=10"));
        assert!(position(&commands, "sysctl -p") < position(&commands, "git clone"));
    }

    #[tokio::test]
    async fn test_build_tools_installed_before_clone() {
        let (node, mock) = node_with(
            MockExecutor::new()
                .on_stdout("cat /etc/os-release", "ID=ubuntu\nID_LIKE=debian\nVERSION_ID=\"22.04\"\n")
                .on_exit("test -e /sys/fs/cgroup", 1)
                .on_stdout("free -m", "Swap: 4096 0 4096\n")
                .on_stdout("df -P -k", DF_OUTPUT)
                .on_stdout("nproc", "2\n"),
        );
        LtpInstaller::default().install(&node).await.unwrap();

        let commands = mock.commands();
        let tools = position(&commands, "apt-get install -y -q git gcc make");
        assert!(tools < position(&commands, "apt-get install -y -q m4 bison"));
        assert!(tools < position(&commands, "git clone"));
        assert!(tools < position(&commands, "make -j 2 all"));
    }

    #[tokio::test]
    async fn test_build_tools_use_family_installer() {
        let (node, mock) = node_with(MockExecutor::new());
        let os = OsInfo::from_release(OsRelease::parse("ID=mariner\nVERSION_ID=\"2.0\"\n")).unwrap();
        LtpInstaller::default()
            .install_dependencies(&node, &os)
            .await
            .unwrap();
        assert_eq!(mock.commands()[0], "tdnf install -y git gcc make");
    }
}
